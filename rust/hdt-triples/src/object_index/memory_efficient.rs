//! Object index built by counting, scattering through a bucketed spool and
//! sorting each object's list in place.
//!
//! Peak memory is the counter sequence, one spool batch per pipeline slot
//! and one sort span, independent of the number of triples.

use std::{ops::Range, time::Instant};

use hdt_bits::{BitmapBuilder, SuccinctBitmap, bits::bits_needed};
use hdt_common::{
    Result,
    error::{Error, FormatViolation},
};
use hdt_sequence::BitPackedSequence;
use rayon::prelude::*;

use super::{ObjectIndex, pair_sort::pair_sort};
use crate::{
    bitmap_triples::BitmapTriples,
    options::ObjectIndexOptions,
    spool::{BucketedSpool, DirectSink, ScatterSink, run_pipelined},
};

pub(super) fn build(bt: &BitmapTriples, options: &ObjectIndexOptions) -> Result<ObjectIndex> {
    let len_z = bt.len();
    let storage = options.index_storage.clone();
    if len_z == 0 {
        return Ok(ObjectIndex::new(
            BitmapBuilder::new().finish(),
            BitPackedSequence::new(0, 0, storage)?,
        ));
    }

    let started = Instant::now();
    let mut bases = count_objects(bt, options)?;
    let bitmap = prefix_sum(&mut bases, len_z)?;
    log::debug!(
        "object index: counted {} objects over {len_z} triples in {:?}",
        bases.len(),
        started.elapsed()
    );

    let started = Instant::now();
    let mut spool = BucketedSpool::new(len_z, &options.spool)?;
    if options.pipeline {
        run_pipelined(
            &mut spool,
            options.pipeline_depth,
            options.poll_timeout,
            |sink| scatter(bt, &mut bases, sink),
        )?;
    } else {
        let mut sink = DirectSink::new(&mut spool);
        scatter(bt, &mut bases, &mut sink)?;
        sink.finish()?;
    }
    drop(bases);
    log::debug!(
        "object index: scattered {len_z} positions into {} buckets in {:?}",
        spool.bucket_count(),
        started.elapsed()
    );

    let started = Instant::now();
    let width = bits_needed(bt.number_of_y() - 1);
    let mut sequence = BitPackedSequence::with_len(width, len_z, storage)?;
    spool.materialize(&mut sequence)?;
    log::debug!(
        "object index: materialized {len_z} slots at {width} bits in {:?}",
        started.elapsed()
    );

    let started = Instant::now();
    sort_lists(bt, &bitmap, &mut sequence, options)?;
    log::debug!(
        "object index: sorted {} lists in {:?}",
        bitmap.count_ones(),
        started.elapsed()
    );
    Ok(ObjectIndex::new(bitmap, sequence))
}

/// Occurrences of every object, at `object - 1`.
fn count_objects(bt: &BitmapTriples, options: &ObjectIndexOptions) -> Result<BitPackedSequence> {
    let mut counts = BitPackedSequence::new(bits_needed(bt.len()), 0, options.index_storage.clone())?;
    let mut longest = 0;
    let mut largest = 0;
    for (pos_z, object) in bt.seq_z().iter().enumerate() {
        let object = object?;
        if object == 0 {
            return Err(FormatViolation::ZeroComponent {
                position: pos_z as u64,
            }
            .into());
        }
        // Contiguous objects `1..=max` never exceed the triple count.
        if object > bt.len() {
            return Err(FormatViolation::NonContiguousObject {
                previous: largest,
                found: object,
            }
            .into());
        }
        largest = largest.max(object);
        counts.grow_to(object)?;
        let count = counts.get(object - 1)? + 1;
        counts.set(object - 1, count)?;
        longest = longest.max(count);
    }
    log::trace!("object index: longest list {longest}");
    Ok(counts)
}

/// Turns counts into list start offsets and marks the last slot of every
/// list. Every object up to the largest must occur.
fn prefix_sum(counts: &mut BitPackedSequence, len_z: u64) -> Result<SuccinctBitmap> {
    let mut bitmap = BitmapBuilder::with_len(len_z);
    let mut next = 0u64;
    for i in 0..counts.len() {
        let count = counts.get(i)?;
        if count == 0 {
            let mut j = i + 1;
            while counts.get(j)? == 0 {
                j += 1;
            }
            return Err(FormatViolation::NonContiguousObject {
                previous: i,
                found: j + 1,
            }
            .into());
        }
        counts.set(i, next)?;
        next += count;
        bitmap.set(next - 1, true);
    }
    Ok(bitmap.finish())
}

/// Sends `(slot, pos_y)` for every Z position; slots of one object are handed
/// out in ascending Z order.
fn scatter<S: ScatterSink + ?Sized>(
    bt: &BitmapTriples,
    bases: &mut BitPackedSequence,
    sink: &mut S,
) -> Result<()> {
    let bitmap_z = bt.bitmap_z();
    let mut pos_y = 0u64;
    for (pos_z, object) in bt.seq_z().iter().enumerate() {
        let object = object?;
        let slot = bases.get(object - 1)?;
        bases.set(object - 1, slot + 1)?;
        sink.push(slot, pos_y)?;
        if bitmap_z.get(pos_z as u64) {
            pos_y += 1;
        }
    }
    Ok(())
}

/// Sorts every object's list by `(y, pos_y)`. Consecutive lists are grouped
/// into spans of about `parallel_sort_batch` slots; the lists of one span
/// are sorted in parallel and the span is written back in one pass.
fn sort_lists(
    bt: &BitmapTriples,
    bitmap: &SuccinctBitmap,
    sequence: &mut BitPackedSequence,
    options: &ObjectIndexOptions,
) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.effective_sort_threads())
        .thread_name(|i| format!("hdt-object-sort-{i}"))
        .build()
        .map_err(|e| Error::invalid_operation(format!("object sort pool: {e}")))?;

    let mut span_start = 0u64;
    let mut lens: Vec<u64> = Vec::new();
    let mut list_start = 0u64;
    while let Some(last) = bitmap.select_next1(list_start) {
        lens.push(last + 1 - list_start);
        list_start = last + 1;
        if list_start - span_start >= options.parallel_sort_batch {
            sort_span(bt, sequence, span_start..list_start, &lens, &pool)?;
            span_start = list_start;
            lens.clear();
        }
    }
    if !lens.is_empty() {
        sort_span(bt, sequence, span_start..list_start, &lens, &pool)?;
    }
    Ok(())
}

fn sort_span(
    bt: &BitmapTriples,
    sequence: &mut BitPackedSequence,
    span: Range<u64>,
    lens: &[u64],
    pool: &rayon::ThreadPool,
) -> Result<()> {
    let mut values = vec![0u64; (span.end - span.start) as usize];
    sequence.read_range(span.start, &mut values)?;

    let mut lists: Vec<&mut [u64]> = Vec::with_capacity(lens.len());
    let mut rest = values.as_mut_slice();
    for &len in lens {
        let (list, tail) = rest.split_at_mut(len as usize);
        lists.push(list);
        rest = tail;
    }
    let seq_y = bt.seq_y();
    pool.install(|| {
        lists.into_par_iter().with_min_len(64).try_for_each_init(
            || (Vec::new(), Vec::new()),
            |(pairs, buffer), list| sort_list(seq_y, list, pairs, buffer),
        )
    })?;

    sequence.set_range(span.start, &values)
}

fn sort_list(
    seq_y: &BitPackedSequence,
    list: &mut [u64],
    pairs: &mut Vec<(u64, u64)>,
    buffer: &mut Vec<(u64, u64)>,
) -> Result<()> {
    match list.len() {
        0 | 1 => return Ok(()),
        2 => {
            let first = (seq_y.get(list[0])?, list[0]);
            let second = (seq_y.get(list[1])?, list[1]);
            if second < first {
                list.swap(0, 1);
            }
            return Ok(());
        }
        _ => {}
    }
    pairs.clear();
    for &pos_y in list.iter() {
        pairs.push((seq_y.get(pos_y)?, pos_y));
    }
    pair_sort(pairs, buffer);
    for (slot, &(_, pos_y)) in list.iter_mut().zip(pairs.iter()) {
        *slot = pos_y;
    }
    Ok(())
}

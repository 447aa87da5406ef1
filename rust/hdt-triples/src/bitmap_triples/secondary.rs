use std::{
    io::{BufRead, Write},
    sync::Arc,
    time::Instant,
};

use hdt_common::{
    Result,
    error::{Error, FormatViolation},
};

use super::BitmapTriples;
use crate::{
    merge::ExternalSorter,
    options::TriplesOptions,
    order::{TripleOrder, convert},
};

impl BitmapTriples {
    /// Builds (or returns the cached) index of the same triples sorted in
    /// `order`.
    ///
    /// Triples are converted to the target layout, externally sorted through
    /// the configured temp store and loaded. Concurrent callers build it once.
    pub fn generate_secondary(&self, order: TripleOrder) -> Result<Arc<BitmapTriples>> {
        self.check_secondary_order(order)?;
        if let Some(secondary) = self.secondary(order) {
            return Ok(secondary.clone());
        }
        let _guard = self.build_guard();
        if let Some(secondary) = self.secondary(order) {
            return Ok(secondary.clone());
        }

        let started = Instant::now();
        let store = self.options.object_index.resolve_temp_store()?;
        let mut sorter = ExternalSorter::new(
            store,
            self.options.object_index.run_length,
            |a: &[u64; 3], b: &[u64; 3]| a.cmp(b),
        );
        for triple in self.iter() {
            let native = self.order.to_layout(&triple?);
            sorter.push(convert(self.order, order, native))?;
        }
        let runs = sorter.spilled_runs();
        let sorted = sorter
            .finish()?
            .map(|record| record.map(|xyz| order.from_layout(xyz)));
        let options = TriplesOptions {
            expected_triples: self.len(),
            ..self.options.clone()
        };
        let built = BitmapTriples::try_load(order, sorted, options)?;
        log::debug!(
            "secondary {order} of {} triples from {runs} runs in {:?}",
            built.len(),
            started.elapsed()
        );
        Ok(self.install_secondary(built).clone())
    }

    /// Writes the cached secondary in `order` as a triples section.
    pub fn save_secondary<W: Write>(&self, order: TripleOrder, writer: &mut W) -> Result<()> {
        let secondary = self.secondary(order).ok_or_else(|| {
            Error::invalid_operation(format!("no secondary index in {order}"))
        })?;
        secondary.save(writer)
    }

    /// Reads a triples section as a secondary of this index and caches it.
    ///
    /// The section must hold as many triples as this index, in another order.
    pub fn load_secondary<R: BufRead>(&self, reader: &mut R) -> Result<Arc<BitmapTriples>> {
        let loaded = BitmapTriples::read(reader, self.options.clone())?;
        self.check_secondary_order(loaded.order())?;
        if loaded.len() != self.len() {
            return Err(FormatViolation::ControlMismatch {
                field: "numTriples".to_string(),
                expected: self.len().to_string(),
                found: loaded.len().to_string(),
            }
            .into());
        }
        Ok(self.install_secondary(loaded).clone())
    }

    fn check_secondary_order(&self, order: TripleOrder) -> Result<()> {
        if order == TripleOrder::Unknown || order == self.order {
            return Err(Error::invalid_arg(
                "order",
                format!("secondary order must differ from {} and be known", self.order),
            ));
        }
        Ok(())
    }

    fn install_secondary(&self, secondary: BitmapTriples) -> &Arc<BitmapTriples> {
        let slot = secondary.order().ordinal() as usize - 1;
        self.secondaries[slot].get_or_init(|| Arc::new(secondary))
    }
}

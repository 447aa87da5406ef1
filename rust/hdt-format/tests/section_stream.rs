use hdt_format::{
    BitmapHeader, ControlBlock, ControlType, HDT_TRIPLES_BITMAP, PayloadReader, PayloadWriter,
    SequenceHeader,
};

#[test]
fn test_consecutive_containers_in_one_stream() {
    let mut rng = fastrand::Rng::with_seed(11);
    let payload: Vec<u8> = (0..37).map(|_| rng.u8(..)).collect();

    let mut out = Vec::new();
    ControlBlock::new(ControlType::Triples, HDT_TRIPLES_BITMAP)
        .with_property("numTriples", 3)
        .write(&mut out)
        .unwrap();
    BitmapHeader { len: 290 }.write(&mut out).unwrap();
    let mut w = PayloadWriter::new(&mut out);
    w.write_all(&payload).unwrap();
    w.finish().unwrap();
    SequenceHeader {
        bit_width: 0,
        len: 5,
    }
    .write(&mut out)
    .unwrap();
    PayloadWriter::new(&mut out).finish().unwrap();

    let mut input = &out[..];
    let block = ControlBlock::read(&mut input).unwrap();
    assert_eq!(block.u64_property("numTriples").unwrap(), 3);

    let bitmap = BitmapHeader::read(&mut input).unwrap();
    assert_eq!(bitmap.payload_len(), 37);
    let mut r = PayloadReader::new(&mut input, bitmap.payload_len(), "bitmap");
    let mut buf = vec![0u8; 37];
    r.read_exact(&mut buf).unwrap();
    r.finish().unwrap();
    assert_eq!(buf, payload);

    let seq = SequenceHeader::read(&mut input).unwrap();
    assert_eq!(seq.payload_len().unwrap(), 0);
    PayloadReader::new(&mut input, 0, "sequence").finish().unwrap();
    assert!(input.is_empty());
}

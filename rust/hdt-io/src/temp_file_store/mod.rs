use crate::ReadAt;

/// The `TemporaryFileStore` trait provides temporary file-like objects
/// to consumers while managing the overall temporary storage budget.
///
/// Disk-backed sequences allocate buffers from it; external sort runs are
/// written to writables and read back sequentially.
pub trait TemporaryFileStore: Send + Sync + 'static {
    /// Allocates a temporary write-only stream that can be appended to
    /// and later converted into a reader.
    ///
    /// # Arguments
    ///
    /// * `size_hint` - An optional hint for the expected size of the stream.
    fn allocate_writable(
        &self,
        size_hint: Option<usize>,
    ) -> std::io::Result<Box<dyn TemporaryWritable>>;

    /// Allocates a temporary read/write buffer that supports appending, reading,
    /// and writing at arbitrary positions.
    ///
    /// # Arguments
    ///
    /// * `size_hint` - An optional hint for the expected size of the buffer.
    fn allocate_buffer(
        &self,
        size_hint: Option<usize>,
    ) -> std::io::Result<Box<dyn TemporaryBuffer>>;

    /// Remaining capacity of the store, in bytes.
    fn available_space(&self) -> u64;
}

/// A temporary write-only stream that can be appended to and converted into a reader.
pub trait TemporaryWritable: std::io::Write + Send + Sync + 'static {
    /// Returns the current size (i.e., the end position) of the stream.
    fn current_size(&self) -> u64;

    /// Truncates the stream to the specified size.
    fn truncate(&mut self, end_pos: u64) -> std::io::Result<()>;

    /// Converts the stream into `std::io::Read`, positioned at the start.
    /// The allocated storage will be released when this reader is dropped.
    fn into_reader(self: Box<Self>) -> std::io::Result<Box<dyn std::io::Read + Send>>;
}

/// A temporary read/write buffer that supports writing at arbitrary positions.
pub trait TemporaryBuffer: TemporaryWritable + ReadAt {
    /// Writes the provided buffer at the specified position, expanding the underlying
    /// storage if necessary.
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> std::io::Result<()>;
}

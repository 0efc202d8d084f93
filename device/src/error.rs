use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The memory object has no allocation on the requested device.
    #[snafu(display("memory object {mem} has no binding on device {device}"))]
    MissingBinding { mem: u64, device: u64 },

    #[snafu(display("memory object {mem} is not an image"))]
    NotAnImage { mem: u64 },

    #[snafu(display("device {device} does not belong to context {context}"))]
    ForeignDevice { device: u64, context: u64 },

    #[snafu(display("event {event} not complete after {waited_ms}ms"))]
    EventTimeout { event: u64, waited_ms: u64 },

    #[snafu(display("event {event} failed: {message}"))]
    EventFailed { event: u64, message: String },
}

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("kernel '{name}' not found in module"))]
    KernelNotFound { name: String },

    /// A loop containing a barrier has no single entry edge.
    #[snafu(display("loop headed by '{header}' in '{function}' has no preheader"))]
    MalformedLoop { function: String, header: String },

    #[snafu(display("required context symbol '{symbol}' is not declared"))]
    MissingContextSymbol { symbol: String },

    #[snafu(display("invalid local size {local_size:?}"))]
    InvalidLocalSize { local_size: [usize; 3] },

    #[snafu(display("IR verification failed: {source}"))]
    Ir { source: tessel_ir::Error },
}

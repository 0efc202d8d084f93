use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A global or function with this name already exists in the module.
    #[snafu(display("duplicate symbol '{name}'"))]
    DuplicateSymbol { name: String },

    /// Function lookup failed.
    #[snafu(display("function '{name}' not found in module"))]
    FunctionNotFound { name: String },

    /// A terminator targets a block that does not exist.
    #[snafu(display("function '{function}': branch to unknown block {block}"))]
    UnknownBlock { function: String, block: u32 },

    /// A call names a function the module does not declare.
    #[snafu(display("function '{function}': call to undeclared function '{callee}'"))]
    UnknownCallee { function: String, callee: String },

    /// An operand names a global the module does not declare.
    #[snafu(display("function '{function}': reference to undeclared global '{global}'"))]
    UnknownGlobal { function: String, global: String },

    /// An operand names a parameter past the end of the signature.
    #[snafu(display("function '{function}': parameter {index} out of range ({count} parameters)"))]
    UnknownParam { function: String, index: usize, count: usize },

    /// A value is used but never defined.
    #[snafu(display("function '{function}': use of undefined value %{value}"))]
    UndefinedValue { function: String, value: u32 },

    /// A value is defined twice.
    #[snafu(display("function '{function}': value %{value} defined more than once"))]
    RedefinedValue { function: String, value: u32 },
}

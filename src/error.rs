use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant aborts compilation of the scope that produced it. None of them describe a
/// user-level failure of the compiled program: they indicate a bug in an upstream IR producer,
/// a pipeline that was configured in an unsupported way, or misuse of the graph API.
///
/// # Error Categories
///
/// ## Malformed IR
/// - [`Error::Malformed`] - Branch to a missing label, result instruction without a result, CFG
///   requested before it was built
///
/// ## Configuration
/// - [`Error::NotSupported`] - A requested feature exists in the model but is not implemented
/// - [`Error::MissingDependency`] - A pass ran before something it needs was available
///
/// ## Analysis
/// - [`Error::GraphError`] - Invalid node or edge reference in a graph
/// - [`Error::NonConvergent`] - A dataflow problem exceeded the configured iteration ceiling
///
/// ## Tooling
/// - [`Error::Serialization`] - Debug persistence failed to encode or decode
///
/// # Examples
///
/// ```rust
/// use irscope::{ast::Node, Error, IrBuilder};
///
/// match IrBuilder::new().build_root(&Node::Nil) {
///     Ok(scope) => println!("built {}", scope.name()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed IR: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR handed to a pass is structurally invalid.
    ///
    /// The error includes the source location where the problem was detected, which helps
    /// tracking down the upstream stage that produced it.
    #[error("Malformed IR - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The requested configuration is understood but not implemented.
    ///
    /// Raised, for example, when a dataflow problem declares a bidirectional direction.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A pass ran before one of its prerequisites.
    #[error("Pass '{pass}' requires {requires}")]
    MissingDependency {
        /// Name of the pass that could not run
        pass: &'static str,
        /// What was missing
        requires: &'static str,
    },

    /// Graph operation error.
    ///
    /// Covers invalid node identifiers and edges that reference removed vertices.
    #[error("{0}")]
    GraphError(String),

    /// A dataflow problem did not reach a fixed point within the iteration ceiling.
    ///
    /// This indicates a non-monotone transfer or meet function.
    #[error("Dataflow problem '{problem}' did not converge after {iterations} iterations")]
    NonConvergent {
        /// Name of the offending problem
        problem: &'static str,
        /// Number of node visits performed before giving up
        iterations: usize,
    },

    /// Encoding or decoding the debug persistence format failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_macro_records_location() {
        let err = malformed_error!("branch to {} has no block", "L3");
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "branch to L3 has no block");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = Error::MissingDependency {
            pass: "DeadCodeElimination",
            requires: "a built CFG",
        };
        assert_eq!(
            err.to_string(),
            "Pass 'DeadCodeElimination' requires a built CFG"
        );

        let err = Error::NonConvergent {
            problem: "LVP",
            iterations: 10,
        };
        assert!(err.to_string().contains("LVP"));
    }
}

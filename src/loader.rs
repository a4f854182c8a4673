use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::GraphError;
use crate::graph::Program;

/// Reads a JSON program (operators, per-op kernel decls and the tensor scope).
pub fn load_program_from_path(path: impl AsRef<Path>) -> Result<Program, GraphError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|err| GraphError::io(path.to_path_buf(), err))?;
    let program: Program =
        serde_json::from_str(&contents).map_err(|source| GraphError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        path = %path.display(),
        ops = program.ops.len(),
        tensors = program.scope.len(),
        "loaded program"
    );
    Ok(program)
}

//! Tessera Template - Template Compiler & Build Assembler
//!
//! Turns template operations into executable ledger operations and assembles
//! a build target's stages into one deployable artifact.
//!
//! Architecture:
//! ```text
//! build.json (target -> stages)
//!     ↓
//! <stage>.json (verbatim)  |  <stage>/main.json (templates)
//!     ↓                          ↓
//!     │                    Compiler (code_expand / code_from_query → code)
//!     ↓                          ↓
//! StageArtifact per stage
//!     ↓
//! Flat artifact (canonical, pretty-printed JSON)
//! ```

pub mod assembler;
pub mod compiler;

pub use assembler::{artifact_digest, flatten, render_artifact, BuildAssembler, StageArtifact};
pub use compiler::canonical::{canonicalize, to_canonical_pretty, to_canonical_string};
pub use compiler::{
    compile_template, expand_operation, expand_transaction, CompiledTemplate, TemplateContext,
    MARKER,
};

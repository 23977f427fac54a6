// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types shared by every other layer:
// no burn tensors, no file I/O.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Error taxonomy of the model core
pub mod error;

/// Hyperparameters persisted with every checkpoint
pub mod hparams;

/// Raw samples: field name → text or number
pub mod sample;

/// Collaborator traits (sample reading, logging)
pub mod traits;

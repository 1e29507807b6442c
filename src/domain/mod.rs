// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that define the core
// concepts of the system.
//
// Rules for this layer:
//   - NO Burn tensors here
//   - NO file I/O beyond reading the run configuration
//   - Only plain data, validation and traits

// Run configuration (architecture, data, training, networks)
pub mod config;

// Error taxonomy shared by the library layers
pub mod error;

// Spectrum samples and dataset items
pub mod sample;

// Core abstractions (traits) that other layers implement
pub mod traits;

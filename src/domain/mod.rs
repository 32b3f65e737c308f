// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums, and traits describing images and
// labels.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// A channels-last f32 image buffer
pub mod image;

// Sparse / one-hot labels and the sample pairing
pub mod label;

// Core abstractions (traits) that other layers implement
pub mod traits;

//! Top-level sampling engine tying the layers together.

pub mod sampler;

//! Remote-service clients for the SpO2 sync pipeline.
//!
//! * [`providers`]: the fitness-tracker API (session handling and SpO2 reads).
//! * [`analytics`]: the training-analytics wellness API.
//! * [`call`]: classification of remote failures into [`call::ErrorCategory`].
//! * [`models`]: payloads exchanged with both services.

pub mod analytics;
pub mod call;
pub mod models;
pub mod providers;

//! Business logic applied to fetched listings.

pub mod error;
pub mod sale_check_service;

pub mod places;

pub use places::{GooglePlacesClient, mask_api_key};

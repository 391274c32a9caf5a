mod mushroom;

pub use mushroom::{Geolocation, Mushroom};

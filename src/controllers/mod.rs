mod add_mushroom;
mod my_mushrooms;

pub use add_mushroom::{AddMushroomController, SaveMushroomError};
pub use my_mushrooms::MyMushroomsController;

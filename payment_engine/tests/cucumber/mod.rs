mod setups;
mod steps;
pub mod storefront_world;

pub use storefront_world::StorefrontWorld;

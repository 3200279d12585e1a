pub mod animation;
pub mod coordinate_system;
pub mod defaults;
pub mod render_settings;

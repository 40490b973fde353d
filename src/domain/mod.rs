pub mod commander;
pub mod joystick;
pub mod models;
pub mod motion;
pub mod settings;

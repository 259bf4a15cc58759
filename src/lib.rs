pub mod assets;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod kiosk;
pub mod persistence;
pub mod rate;
pub mod render;
pub mod services;
pub mod session;

pub mod platform {
    pub mod gpio;
    pub mod shell;
}

pub mod processing {
    pub mod compositor;
    pub mod layout;
    pub mod screens;
}

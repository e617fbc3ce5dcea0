pub mod config;
pub mod error;
pub mod events;
pub mod flags;
pub mod library;
pub mod playlist;
pub mod resume;
pub mod processing {
    pub mod blur;
    pub mod color;
    pub mod compose;
    pub mod decode;
    pub mod layout;
    pub mod orientation;
    pub mod padding;
    pub mod resize;
}
pub mod render {
    pub mod cache;
    pub mod pool;
    pub mod renderer;
}
pub mod display {
    pub mod placeholder;
    pub mod player;
    pub mod screen;
    pub mod state;
}
pub mod tasks {
    pub mod control;
    pub mod viewer;
    pub mod watcher;
}

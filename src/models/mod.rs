// src/models/mod.rs
pub mod event;
pub mod player;

pub use event::{CreateEventRequest, CreateEventResponse, GameEvent, NewEvent};
pub use player::{
    Identity, PartialProfile, Player, PlayerDto, PlayerResponse, PlayerState, Resources,
    SyncRequest,
};

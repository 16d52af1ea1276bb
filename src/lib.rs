//! steam-sale-bot - A Discord bot that alerts guilds about Steam sales and releases.
//!
//! Once a day every tracked Steam listing is fetched from the store API and
//! compared with what each subscribed guild was last told. Guilds hear about
//! a listing when its discount reaches their threshold or when it leaves the
//! coming-soon state.

pub mod bot;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod notifier;
pub mod repository;
pub mod service;
pub mod source;
pub mod task;

//! Catalog of Nintendo DS and DSi roms.
//!
//! Roms are grouped into games by the cartridge id in their header. Every release of a game is a
//! variant with its own packed archive and cover inside an artifact store, and the whole catalog
//! persists as a single document that older flat catalogs are migrated into.

pub mod catalog;
pub mod config;
pub mod cover_art;
pub mod migration;
pub mod persistence;
pub mod rom;
pub mod store;

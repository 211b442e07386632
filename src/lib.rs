//! Gated sequential lesson playback for course pages.
//!
//! An embeddable engine: the host shell (webview wrapper, desktop course
//! player, test harness) supplies a [`page::PageSurface`] and feeds player
//! events in; the engine decides which lesson videos are locked, persists
//! watch progress across reloads through a layered best-effort store, and
//! reports progress to the funnel backend.
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//!
//! use lesson_gate::page::VirtualPage;
//! use lesson_gate::player::PlayerRegistry;
//! use lesson_gate::session::{LessonSession, SessionParams};
//! use lesson_gate::store::{LayerKind, LayeredStore, MemoryBackend};
//! use lesson_gate::telemetry::TelemetryClient;
//!
//! # async fn host() -> lesson_gate::Result<()> {
//! let config = lesson_gate::bootstrap::init()?;
//! let scratch = Arc::new(MemoryBackend::new(LayerKind::Session));
//! let store = LayeredStore::from_config(&config, scratch);
//! let telemetry = Arc::new(TelemetryClient::new(&config.telemetry_base_url)?);
//!
//! let page = VirtualPage::new(); // a real host bridges its own surface
//! let registry = Arc::new(Mutex::new(PlayerRegistry::new()));
//! let params = SessionParams {
//!     page_url: "https://pages.example.com/lesson-2?userId=31&contactId=557".into(),
//!     user_id: "31".into(),
//!     contact_id: "557".into(),
//!     ..SessionParams::default()
//! };
//! let (session, handle) = LessonSession::new(
//!     &config,
//!     store,
//!     Box::new(page),
//!     registry,
//!     Some(telemetry),
//!     params,
//! );
//! tokio::spawn(session.run());
//! // feed handle.player_event(..) from the player framework bindings
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod completion;
pub mod config;
pub mod navigation;
pub mod page;
pub mod player;
pub mod progress;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod unlock;

pub use config::Config;
pub use session::{LessonSession, SessionHandle, SessionParams};

pub type Result<T> = anyhow::Result<T>;

//! Session bookkeeping for the allocator engine.
//!
//! `warden` owns the live [`Engine`] instances -- zero or more of
//! them, each under an opaque session id -- and maps a line-oriented
//! command vocabulary onto the engine contract. Ownership points one
//! way only: engines know nothing about the registry that holds them,
//! and disposing a session is the sole way an instance's lifetime
//! ends.
//!
//! Every command comes back as a [`Reply`]: a success flag, a message
//! fit for humans, and (when the operation yields one) a payload. An
//! engine error or an unknown session travels that same path --
//! nothing is swallowed and nothing panics across this boundary.

use std::hash::BuildHasherDefault;

use ahash::AHasher;
use fitcore::harness::{self, DrillConfig};
use fitcore::{AllocError, BlockId, Bytes, Engine, Segment, DEFAULT_SIZES};
use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub type SessionId = u64;

/// The book of live instances, in creation order.
type SessionBook = IndexMap<SessionId, Engine, BuildHasherDefault<AHasher>>;

/// One request across the boundary. Allocation sizes arrive signed so
/// that a negative request is reported as invalid, not mangled.
#[derive(Deserialize, Clone, Debug)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Command {
    Init {
        size: Bytes,
    },
    Alloc {
        session: SessionId,
        size: i64,
    },
    Free {
        session: SessionId,
        id: BlockId,
    },
    Stats {
        session: SessionId,
    },
    Reset {
        session: SessionId,
    },
    Bench {
        #[serde(default = "default_bench_size")]
        size: Bytes,
        iterations: usize,
        #[serde(default)]
        seed: u64,
        #[serde(default)]
        sizes: Vec<Bytes>,
    },
    Defrag {
        session: SessionId,
    },
    Layout {
        session: SessionId,
    },
    Drop {
        session: SessionId,
    },
}

fn default_bench_size() -> Bytes {
    8192
}

/// The uniform reply envelope.
#[derive(Serialize, Clone, Debug)]
pub struct Reply {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Reply {
    fn ok(message: String, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message,
            data,
        }
    }

    pub fn fail(message: String) -> Self {
        Self {
            success: false,
            message,
            data: None,
        }
    }
}

fn no_such_session(session: SessionId) -> Reply {
    Reply::fail(format!("allocator instance {session} not found"))
}

fn payload<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

/// Owns zero or more engines by session id.
pub struct Registry {
    sessions:       SessionBook,
    next_session:   SessionId,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sessions:       SessionBook::default(),
            next_session:   1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Runs one command to completion. Every failure mode -- unknown
    /// session, engine error, bad argument -- comes back as a
    /// `success: false` reply.
    pub fn dispatch(&mut self, cmd: Command) -> Reply {
        match cmd {
            Command::Init { size } => {
                if size == 0 {
                    return Reply::fail(
                        "invalid size: an instance needs a non-empty range".into(),
                    );
                }
                let session = self.next_session;
                self.next_session += 1;
                self.sessions.insert(session, Engine::new(size));
                info!("session {session}: {size}B instance created");
                Reply::ok(
                    format!("allocator initialized with {size} bytes"),
                    Some(json!({ "session": session })),
                )
            }
            Command::Alloc { session, size } => {
                let Some(engine) = self.sessions.get_mut(&session) else {
                    return no_such_session(session);
                };
                if size <= 0 {
                    return Reply::fail(AllocError::InvalidSize.to_string());
                }
                match engine.allocate(size as Bytes) {
                    Ok(grant) => Reply::ok(
                        format!("allocated {size} bytes at offset {}", grant.offset),
                        Some(json!({
                            "id":       grant.id,
                            "offset":   grant.offset,
                            "stats":    engine.stats(),
                        })),
                    ),
                    Err(e) => Reply::fail(e.to_string()),
                }
            }
            Command::Free { session, id } => {
                let Some(engine) = self.sessions.get_mut(&session) else {
                    return no_such_session(session);
                };
                match engine.free(id) {
                    Ok(()) => Reply::ok(
                        format!("released block {id}"),
                        payload(&engine.stats()),
                    ),
                    Err(e) => Reply::fail(e.to_string()),
                }
            }
            Command::Stats { session } => {
                let Some(engine) = self.sessions.get(&session) else {
                    return no_such_session(session);
                };
                Reply::ok("stats snapshot".into(), payload(&engine.stats()))
            }
            Command::Reset { session } => {
                let Some(engine) = self.sessions.get_mut(&session) else {
                    return no_such_session(session);
                };
                engine.reset();
                Reply::ok("allocator reset".into(), payload(&engine.stats()))
            }
            Command::Bench {
                size,
                iterations,
                seed,
                sizes,
            } => {
                if size == 0 {
                    return Reply::fail("invalid size: benchmark needs a non-empty range".into());
                }
                if iterations == 0 {
                    return Reply::fail("benchmark needs at least one iteration".into());
                }
                let cfg = DrillConfig {
                    total_size: size,
                    iterations,
                    sizes: if sizes.is_empty() {
                        DEFAULT_SIZES.to_vec()
                    } else {
                        sizes
                    },
                    seed,
                };
                let report = harness::run(&cfg);
                info!(
                    "bench: {} iterations, {:.1}% success",
                    iterations,
                    report.success_rate * 100.0
                );
                Reply::ok("benchmark completed".into(), payload(&report))
            }
            Command::Defrag { session } => {
                let Some(engine) = self.sessions.get_mut(&session) else {
                    return no_such_session(session);
                };
                engine.defragment();
                Reply::ok("defragmentation completed".into(), payload(&engine.stats()))
            }
            Command::Layout { session } => {
                let Some(engine) = self.sessions.get(&session) else {
                    return no_such_session(session);
                };
                let blocks: Vec<Segment> = engine.layout().collect();
                let stats = engine.stats();
                Reply::ok(
                    "layout snapshot".into(),
                    Some(json!({
                        "blocks":           blocks,
                        "total_size":       stats.total_size,
                        "allocated_bytes":  stats.allocated_bytes,
                        "free_bytes":       stats.free_bytes,
                    })),
                )
            }
            Command::Drop { session } => {
                if self.sessions.shift_remove(&session).is_some() {
                    info!("session {session} disposed");
                    Reply::ok(format!("allocator instance {session} disposed"), None)
                } else {
                    no_such_session(session)
                }
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

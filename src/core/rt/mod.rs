// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime primitives for lock-free data structures and event handling.

pub mod slabpool;

pub use slabpool::{SlabHandle, SlabPool};

use std::sync::{Arc, OnceLock};

static GLOBAL_SLAB_POOL: OnceLock<Arc<SlabPool>> = OnceLock::new();

/// Initialize global slab pool
pub fn init_slab_pool() -> Arc<SlabPool> {
    GLOBAL_SLAB_POOL
        .get_or_init(|| Arc::new(SlabPool::new()))
        .clone()
}

/// Get global slab pool (creates if not initialized)
pub fn get_slab_pool() -> Arc<SlabPool> {
    GLOBAL_SLAB_POOL
        .get()
        .cloned()
        .unwrap_or_else(init_slab_pool)
}

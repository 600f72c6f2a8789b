// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thread hand-off primitives shared by the background workers.

mod latch;

pub use latch::CountDownLatch;

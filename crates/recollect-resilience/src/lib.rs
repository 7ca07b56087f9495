// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry primitives for provider calls.
//!
//! Only errors whose [`recollect_core::ProviderErrorKind`] is retryable
//! (rate limit, timeout, unavailable) are attempted again. Everything else
//! is returned to the caller on the first failure.

pub mod retry;

pub use retry::{RetryPolicy, retry};

//! Feature-gated tracing for scheduler internals.
//!
//! All helpers compile to no-op inline functions unless the `tracing`
//! feature is enabled, so the scheduler loop carries no instrumentation cost
//! by default.

/// Target name for scheduler tracing events.
#[cfg(feature = "tracing")]
const SERVER_TARGET: &str = "md5_lanes::server";

/// Traces a stream being bound to a lane.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_lane_bound(uid: u64, lane: usize) {
    tracing::trace!(target: SERVER_TARGET, uid, lane, "lane bound");
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn trace_lane_bound(_uid: u64, _lane: usize) {}

/// Traces a lane returning to the free pool.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_lane_released(uid: u64, lane: usize) {
    tracing::trace!(target: SERVER_TARGET, uid, lane, "lane released");
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn trace_lane_released(_uid: u64, _lane: usize) {}

/// Traces a stream parked because every lane is occupied.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_stream_parked(uid: u64) {
    tracing::trace!(target: SERVER_TARGET, uid, "stream waiting for a lane");
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn trace_stream_parked(_uid: u64) {}

/// Traces one compression round: how many lanes carried live blocks out of
/// the kernel width.
#[cfg(feature = "tracing")]
#[inline]
pub(crate) fn trace_round(active: usize, width: usize) {
    tracing::trace!(target: SERVER_TARGET, active, width, "compression round");
}

/// No-op when tracing is disabled.
#[cfg(not(feature = "tracing"))]
#[inline]
pub(crate) fn trace_round(_active: usize, _width: usize) {}

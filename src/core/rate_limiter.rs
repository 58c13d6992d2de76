//! Token bucket admission control for simulated inbound traffic.
//!
//! One bucket guards the whole simulated service. It is refilled once per tick
//! from monotonic time and drained by the number of requests admitted that tick.
//! A refill rate of zero disables replenishment (rate limiting switched off
//! leaves the bucket to drain whatever capacity remains).

use std::time::Instant;

/// Token bucket state. `0 <= tokens <= capacity` holds after every operation.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a full bucket. Negative or non-finite parameters are clamped to zero.
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        let capacity = sanitize(capacity);
        Self {
            capacity,
            tokens: capacity,
            refill_rate: sanitize(refill_rate),
            last_refill: now,
        }
    }

    /// Add `elapsed * refill_rate` tokens, capped at capacity.
    ///
    /// A `now` earlier than the last refill adds nothing.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = f64::min(self.capacity, self.tokens + elapsed * self.refill_rate);
        self.last_refill = now;
    }

    /// Admit up to `requested` units, limited by the whole tokens available.
    /// Returns the admitted count; the caller derives dropped = requested - admitted.
    pub fn admit(&mut self, requested: u64) -> u64 {
        let available = self.tokens.floor() as u64;
        let admitted = requested.min(available);
        self.tokens = (self.tokens - admitted as f64).max(0.0);
        admitted
    }

    /// Give back `returned` previously admitted units, capped at capacity.
    pub fn restore(&mut self, returned: u64) {
        self.tokens = f64::min(self.capacity, self.tokens + returned as f64);
    }

    /// Change the refill rate without touching the current token count.
    pub fn set_refill_rate(&mut self, refill_rate: f64) {
        self.refill_rate = sanitize(refill_rate);
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

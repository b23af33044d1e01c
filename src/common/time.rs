mod clock;
mod instant;

pub(crate) use clock::Clock;
pub(crate) use instant::Instant;

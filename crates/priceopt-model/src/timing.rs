use std::time::{Duration, Instant};

/// Records that carry the wall-clock time of the operation that produced them
pub trait Timed {
    fn set_duration(&mut self, duration: Duration);
}

/// Runs `op` and stamps its elapsed time onto the successful result
pub fn timed<T, E, F>(op: F) -> Result<T, E>
where
    T: Timed,
    F: FnOnce() -> Result<T, E>,
{
    let start = Instant::now();
    let mut value = op()?;
    value.set_duration(start.elapsed());
    Ok(value)
}

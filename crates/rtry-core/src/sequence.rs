//! Explicit delay sequences addressed by attempt position.

use std::fmt;

use crate::duration;

/// An ordered list of delays, optionally repeating the last one forever.
///
/// Two access patterns are supported: [`Sequence::delay_by_position`] looks a
/// delay up by 1-based attempt number, and [`Sequence::next_delay_ms`] walks an
/// internal cursor. Walking from a fresh cursor yields the same values as
/// positions `1, 2, 3, ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    delays_ms: Vec<u64>,
    repeat_last: bool,
    cursor: usize,
}

impl Sequence {
    pub fn new(delays_ms: Vec<u64>, repeat_last: bool) -> Self {
        Self {
            delays_ms,
            repeat_last,
            cursor: 0,
        }
    }

    pub fn delays_ms(&self) -> &[u64] {
        &self.delays_ms
    }

    pub fn repeats_last(&self) -> bool {
        self.repeat_last
    }

    /// Delay for the given 1-based attempt number, or `None` when the sequence
    /// has nothing for that position.
    pub fn delay_by_position(&self, attempt: u32) -> Option<u64> {
        let position = (attempt as usize).checked_sub(1)?;
        match self.delays_ms.get(position) {
            Some(&d) => Some(d),
            None if self.repeat_last => self.delays_ms.last().copied(),
            None => None,
        }
    }

    /// Next delay from the internal cursor; advances it.
    pub fn next_delay_ms(&mut self) -> Option<u64> {
        if let Some(&d) = self.delays_ms.get(self.cursor) {
            self.cursor += 1;
            return Some(d);
        }
        if self.repeat_last {
            return self.delays_ms.last().copied();
        }
        None
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<String> = self.delays_ms.iter().map(|&ms| duration::format_ms(ms)).collect();
        write!(f, "{}", tokens.join(","))?;
        if self.repeat_last {
            f.write_str("*")?;
        }
        Ok(())
    }
}

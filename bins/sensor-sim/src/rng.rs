use std::time::{SystemTime, UNIX_EPOCH};

/// xorshift64. С ненулевым seed последовательность воспроизводима.
pub struct Rng(u64);

impl Rng {
    /// `seed == 0` — взять seed из часов.
    pub fn new(seed: i64) -> Self {
        match seed {
            0 => Self::from_clock(),
            s => Self(s as u64),
        }
    }

    fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        // нулевое состояние xorshift не покидает
        Self(nanos | 1)
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// [0, 1)
    pub fn next_f64(&mut self) -> f64 {
        const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
        (self.next_u64() >> 11) as f64 * SCALE
    }

    /// [-1, 1)
    pub fn next_signed(&mut self) -> f64 {
        self.next_f64().mul_add(2.0, -1.0)
    }

    /// `true` с вероятностью `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        p > 0.0 && self.next_f64() < p
    }
}

use sensor_api::{DataRecord, Reading, SourceKind, now_micros, timestamp_from_micros};

use crate::rng::Rng;

// ═══════════════════════════════════════════════════════════════
//  Random walk по показаниям
// ═══════════════════════════════════════════════════════════════

const TEMPERATURE_STEP: f64 = 0.25;
const TEMPERATURE_RANGE: (f32, f32) = (-40.0, 60.0);
const PRESSURE_STEP: f64 = 3.0;
const MOTION_STEP: f64 = 50.0;

/// Состояние одного эмулируемого сенсора.
pub struct Walk {
    reading: Reading,
}

impl Walk {
    pub fn new(kind: SourceKind) -> Self {
        let reading = match kind {
            SourceKind::Server1 => Reading::Climate { temperature: 21.5, pressure: 1013 },
            SourceKind::Server2 => Reading::Motion { x: 0, y: 0, z: 0 },
        };
        Self { reading }
    }

    pub fn tick(&mut self, rng: &mut Rng) {
        self.reading = match self.reading {
            Reading::Climate { temperature, pressure } => Reading::Climate {
                temperature: (temperature + (rng.next_signed() * TEMPERATURE_STEP) as f32)
                    .clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1),
                pressure: pressure.saturating_add((rng.next_signed() * PRESSURE_STEP).round() as i16),
            },
            Reading::Motion { x, y, z } => Reading::Motion {
                x: x.saturating_add((rng.next_signed() * MOTION_STEP).round() as i32),
                y: y.saturating_add((rng.next_signed() * MOTION_STEP).round() as i32),
                z: z.saturating_add((rng.next_signed() * MOTION_STEP).round() as i32),
            },
        };
    }

    /// Текущее показание со штампом "сейчас".
    pub fn record(&self) -> DataRecord {
        let micros = now_micros();
        DataRecord {
            // now_micros всегда в диапазоне chrono
            timestamp: timestamp_from_micros(micros).unwrap_or_default(),
            reading: self.reading,
        }
    }
}

/// Simulated reporter producing a random walk of readings
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{sleep, Duration};

use crate::context::AppContext;
use crate::error::Result;
use crate::ingest::{ingest, IngestBatch, WriteCounts};

const OPEN_CODE: &str = "DO";
const CLOSE_CODE: &str = "DC";

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Epoch seconds of the first reading
    pub start: i64,
    /// Minutes between consecutive readings
    pub interval_minutes: i64,
    pub count: usize,
    /// Attach an alternating open/close event to every n-th reading (0 = never)
    pub door_every: usize,
    /// Real time to wait between submissions
    pub pace: Duration,
}

/// One simulated sensor: temperature starts in [17, 22), humidity in
/// [55, 70), and each reading drifts both by up to one unit.
pub struct SimulatedSensor<R> {
    rng: R,
    temperature: f64,
    humidity: f64,
    timestamp: i64,
    interval_secs: i64,
    door_every: usize,
    readings: usize,
    door_open: bool,
}

impl<R: Rng> SimulatedSensor<R> {
    pub fn new(mut rng: R, start: i64, interval_minutes: i64, door_every: usize) -> Self {
        let temperature = rng.random_range(17.0..22.0);
        let humidity = rng.random_range(55.0..70.0);
        SimulatedSensor {
            rng,
            temperature,
            humidity,
            timestamp: start,
            interval_secs: interval_minutes * 60,
            door_every,
            readings: 0,
            door_open: false,
        }
    }

    /// Next reading as a single-index batch signed with `api_key`.
    pub fn next_batch(&mut self, api_key: &str) -> IngestBatch {
        self.temperature += self.rng.random_range(-1.0..1.0);
        self.humidity += self.rng.random_range(-1.0..1.0);
        self.readings += 1;

        let mut event_types = Vec::new();
        if self.door_every > 0 && self.readings % self.door_every == 0 {
            let code = if self.door_open { CLOSE_CODE } else { OPEN_CODE };
            self.door_open = !self.door_open;
            event_types.push(code.to_string());
        }

        let batch = IngestBatch {
            api_key: Some(api_key.to_string()),
            timestamps: vec![self.timestamp.to_string()],
            temperatures: vec![format!("{:.6}", self.temperature)],
            humidities: vec![format!("{:.6}", self.humidity)],
            event_types,
        };
        self.timestamp += self.interval_secs;
        batch
    }
}

/// Feed `settings.count` simulated readings through the ingestion path.
pub async fn run(ctx: &AppContext, settings: &SimulationSettings) -> Result<WriteCounts> {
    info!(
        "Simulating {} readings from {} every {} minutes",
        settings.count, settings.start, settings.interval_minutes
    );

    let mut sensor = SimulatedSensor::new(
        StdRng::from_os_rng(),
        settings.start,
        settings.interval_minutes,
        settings.door_every,
    );
    let mut total = WriteCounts::default();

    for i in 0..settings.count {
        let batch = sensor.next_batch(&ctx.config.api_key);
        info!("Sending {}", batch.to_query());
        let counts = ingest(ctx, &batch).await?;
        total.measurements += counts.measurements;
        total.events += counts.events;

        if !settings.pace.is_zero() && i + 1 < settings.count {
            sleep(settings.pace).await;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::validate;

    fn sensor(door_every: usize) -> SimulatedSensor<StdRng> {
        SimulatedSensor::new(StdRng::seed_from_u64(7), 1_345_678_910, 5, door_every)
    }

    #[test]
    fn test_readings_are_spaced_and_plausible() {
        let mut s = sensor(0);
        let batches: Vec<IngestBatch> = (0..20).map(|_| s.next_batch("key")).collect();

        for (i, b) in batches.iter().enumerate() {
            assert_eq!(b.timestamps, vec![(1_345_678_910 + i as i64 * 300).to_string()]);
            assert!(b.event_types.is_empty());
            let t: f64 = b.temperatures[0].parse().unwrap();
            let h: f64 = b.humidities[0].parse().unwrap();
            assert!((16.0 - i as f64..23.0 + i as f64).contains(&t));
            assert!((54.0 - i as f64..71.0 + i as f64).contains(&h));
        }
    }

    #[test]
    fn test_door_events_alternate() {
        let mut s = sensor(2);
        let events: Vec<Vec<String>> = (0..8).map(|_| s.next_batch("key").event_types).collect();
        let expected: Vec<Vec<String>> = [
            vec![],
            vec!["DO"],
            vec![],
            vec!["DC"],
            vec![],
            vec!["DO"],
            vec![],
            vec!["DC"],
        ]
        .into_iter()
        .map(|v| v.into_iter().map(String::from).collect())
        .collect();
        assert_eq!(events, expected);
    }

    #[test]
    fn test_batches_pass_validation() {
        let mut s = sensor(1);
        let batch = s.next_batch("key");
        let validated = validate(&batch, "key", 10).unwrap();
        assert_eq!(validated.measurements.len(), 1);
        assert_eq!(validated.events.len(), 1);
        assert!(validated.issues.is_empty());
    }
}

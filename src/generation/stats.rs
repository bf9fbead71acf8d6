use chrono::{DateTime, Local};
use serde::Serialize;
use uuid::Uuid;

/// Counters describing one generation run
#[derive(Debug, Clone, Serialize)]
pub struct RunStatistics {
    pub run_id: Uuid,
    pub topic: String,
    pub total_requested: usize,
    pub words_generated: usize,
    pub flashcards_created: usize,
    pub images_downloaded: usize,
    pub api_errors: usize,
    pub validation_errors: usize,
    pub image_errors: usize,
    pub cache_hit: bool,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            topic: String::new(),
            total_requested: 0,
            words_generated: 0,
            flashcards_created: 0,
            images_downloaded: 0,
            api_errors: 0,
            validation_errors: 0,
            image_errors: 0,
            cache_hit: false,
            started_at: None,
            finished_at: None,
        }
    }
}

impl RunStatistics {
    /// Fresh statistics for a new run
    pub fn start(topic: &str, requested: usize) -> Self {
        Self {
            topic: topic.to_string(),
            total_requested: requested,
            started_at: Some(Local::now()),
            ..Default::default()
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Local::now());
    }

    /// Wall-clock duration, if the run has finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Share of requested records that were created, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requested == 0 {
            return 0.0;
        }
        self.flashcards_created as f64 / self.total_requested as f64 * 100.0
    }

    pub fn total_errors(&self) -> usize {
        self.api_errors + self.validation_errors + self.image_errors
    }

    /// Multi-line human readable summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Run {} for topic '{}'", self.run_id, self.topic),
            format!("  Requested:          {}", self.total_requested),
            format!("  Terms generated:    {}{}", self.words_generated, if self.cache_hit { " (cached)" } else { "" }),
            format!("  Flashcards created: {}", self.flashcards_created),
            format!("  Images downloaded:  {}", self.images_downloaded),
            format!("  Success rate:       {:.1}%", self.success_rate()),
        ];

        if self.total_errors() > 0 {
            lines.push(format!(
                "  Errors:             {} (api: {}, validation: {}, image: {})",
                self.total_errors(),
                self.api_errors,
                self.validation_errors,
                self.image_errors
            ));
        }
        if let Some(duration) = self.duration() {
            lines.push(format!(
                "  Duration:           {:.2}s",
                duration.num_milliseconds() as f64 / 1000.0
            ));
        }

        lines.join("\n")
    }
}

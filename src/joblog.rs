//! Per-job log handle with a colorized `[name]` prefix, deterministic per
//! job name.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use console::{style, Color};
use uuid::Uuid;

fn name_to_term_color(name: &str) -> Color {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    let hash = hasher.finish();
    let mut color_num = hash % 229;
    color_num = match color_num {
        0 => 1,
        15..=24 => color_num - 14,
        52..=56 => color_num - 51,
        _ => color_num,
    };
    Color::Color256(color_num as u8)
}

/// A handle a recipe's producer can use to log against its own job, without
/// needing to know its own name or job id — both are bound when the
/// recipe wrapper constructs it.
#[derive(Clone, Debug)]
pub struct JobLog {
    name: String,
    job_id: String,
}

impl JobLog {
    pub fn new(name: Option<&str>) -> Self {
        let job_id = Uuid::new_v4().to_string()[..8].to_string();
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("job {job_id}"),
        };
        JobLog { name, job_id }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn prefix(&self) -> console::StyledObject<String> {
        style(format!("[{}]", self.name)).fg(name_to_term_color(&self.name))
    }

    pub fn print(&self, msg: impl AsRef<str>) {
        log::info!("{} {}", self.prefix(), msg.as_ref());
    }

    pub fn trace(&self, msg: impl AsRef<str>) {
        log::debug!("{} {}", self.prefix(), msg.as_ref());
    }

    pub fn warning(&self, msg: impl AsRef<str>) {
        log::warn!("{} {}", self.prefix(), msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        log::error!("{} {}", self.prefix(), msg.as_ref());
    }

    pub fn fail(&self, msg: &str) {
        log::error!("{} {}", self.prefix(), msg);
    }

    pub fn finish(&self, msg: &str) {
        log::info!("{} {}", self.prefix(), msg);
    }
}

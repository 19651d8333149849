use crate::sample::SampleRecord;
use crate::{Error, Result};
use chrono::{DateTime, Local, NaiveDate};
use std::fmt::Display;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Operator timestamp format shared by the text log and the daemon log.
pub const TIMESTAMP_FORMAT: &str = "%b %d %Y %H:%M:%S";

/// Data-logging state, persisted in the config file so a restart resumes
/// where the daemon left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogState {
    #[default]
    Active,
    Paused,
    Stopped,
}

impl LogState {
    pub fn as_str(self) -> &'static str {
        match self {
            LogState::Active => "active",
            LogState::Paused => "paused",
            LogState::Stopped => "stopped",
        }
    }
}

impl std::str::FromStr for LogState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(LogState::Active),
            "paused" => Ok(LogState::Paused),
            "stopped" => Ok(LogState::Stopped),
            other => Err(Error::InvalidArgs(format!("unknown logging state '{other}'"))),
        }
    }
}

struct Session {
    batch: String,
    day: NaiveDate,
    local_json: PathBuf,
    public_json: PathBuf,
    local_csv: PathBuf,
    public_csv: PathBuf,
}

/// Appends completed sample records to a per-batch JSON Lines store and a
/// delimited text mirror, then republishes both files to the public
/// directory. Appending while paused or stopped is a no-op that keeps the
/// session open for a later resume.
pub struct LogPipeline {
    data_dir: PathBuf,
    public_dir: PathBuf,
    state: LogState,
    session: Option<Session>,
}

impl LogPipeline {
    pub fn new(data_dir: PathBuf, public_dir: PathBuf, state: LogState) -> Self {
        Self {
            data_dir,
            public_dir,
            state,
            session: None,
        }
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    pub fn set_state(&mut self, state: LogState) {
        self.state = state;
    }

    /// Open append targets for `batch`, dated today. Called at daemon
    /// start and when a new session begins.
    pub fn start_session(&mut self, batch: &str) -> Result<()> {
        self.start_session_on(batch, Local::now().date_naive())
    }

    pub fn start_session_on(&mut self, batch: &str, day: NaiveDate) -> Result<()> {
        if self.state != LogState::Active {
            return Ok(());
        }
        let local_dir = self.data_dir.join(batch);
        let public_dir = self.public_dir.join(batch);
        fs::create_dir_all(&local_dir)?;
        fs::create_dir_all(&public_dir)?;

        let stem = dated_stem(&local_dir, batch, day);
        let local_json = local_dir.join(format!("{stem}.jsonl"));
        // The structured store starts empty so a reader can tell a fresh
        // session from a missing one.
        fs::File::create(&local_json)?;

        self.session = Some(Session {
            batch: batch.to_string(),
            day,
            public_json: public_dir.join(format!("{stem}.jsonl")),
            local_csv: local_dir.join(format!("{batch}.csv")),
            public_csv: public_dir.join(format!("{batch}.csv")),
            local_json,
        });
        Ok(())
    }

    /// Forget the append targets; used when logging stops for good.
    pub fn end_session(&mut self) {
        self.session = None;
    }

    pub fn append(&mut self, record: &SampleRecord) -> Result<()> {
        self.append_at(record, Local::now())
    }

    pub fn append_at(&mut self, record: &SampleRecord, now: DateTime<Local>) -> Result<()> {
        if self.state != LogState::Active {
            return Ok(());
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        // New calendar day: the structured store rolls to a fresh file,
        // the text log keeps accumulating per batch.
        if now.date_naive() != session.day {
            let batch = session.batch.clone();
            self.start_session_on(&batch, now.date_naive())?;
        }
        let Some(session) = self.session.as_ref() else {
            return Ok(());
        };

        let mut json = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&session.local_json)?;
        writeln!(json, "{}", serde_json::to_string(record).map_err(io_err)?)?;

        let mut csv = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&session.local_csv)?;
        writeln!(csv, "{}", csv_line(now, record))?;

        publish(&session.local_json, &session.public_json)?;
        publish(&session.local_csv, &session.public_csv)?;
        Ok(())
    }

    #[cfg(test)]
    fn current_json_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.local_json.as_path())
    }
}

/// `<batch>-<day>`, with a numeric suffix when a file for that day already
/// exists, so a restart never overwrites earlier data.
fn dated_stem(dir: &Path, batch: &str, day: NaiveDate) -> String {
    let base = format!("{batch}-{}", day.format("%Y-%m-%d"));
    if !dir.join(format!("{base}.jsonl")).exists() {
        return base;
    }
    let mut i = 1;
    while dir.join(format!("{base}-{i}.jsonl")).exists() {
        i += 1;
    }
    format!("{base}-{i}")
}

/// Fixed column order; absent fields become an explicit `null` so column
/// alignment never shifts.
fn csv_line(now: DateTime<Local>, record: &SampleRecord) -> String {
    format!(
        "{};{};{};{};{};{};{};{};{}",
        now.format(TIMESTAMP_FORMAT),
        csv_value(&record.beer_temp),
        csv_value(&record.beer_set),
        csv_value(&record.beer_ann),
        csv_value(&record.fridge_temp),
        csv_value(&record.fridge_set),
        csv_value(&record.fridge_ann),
        csv_value(&record.state),
        csv_value(&record.room_temp),
    )
}

fn csv_value<T: Display>(value: &Option<T>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "null".to_string(),
    }
}

/// Republish by copy-then-rename: a concurrent reader of the public file
/// sees either the old or the new content, never a torn write.
fn publish(local: &Path, public: &Path) -> Result<()> {
    let tmp = public.with_extension("tmp");
    fs::copy(local, &tmp)?;
    fs::rename(&tmp, public)?;
    Ok(())
}

fn io_err(err: serde_json::Error) -> Error {
    Error::Io(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn pipeline(dir: &Path) -> LogPipeline {
        LogPipeline::new(dir.join("data"), dir.join("public"), LogState::Active)
    }

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn appends_to_both_logs_and_publishes() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        pipeline
            .start_session_on("stout", local(2026, 3, 4, 9).date_naive())
            .unwrap();

        let mut record = SampleRecord::zero();
        record.beer_temp = Some(20.1);
        pipeline.append_at(&record, local(2026, 3, 4, 10)).unwrap();

        let json = fs::read_to_string(dir.path().join("data/stout/stout-2026-03-04.jsonl")).unwrap();
        assert_eq!(json.lines().count(), 1);
        assert!(json.contains("\"BeerTemp\":20.1"));

        let csv = fs::read_to_string(dir.path().join("data/stout/stout.csv")).unwrap();
        assert!(csv.starts_with("Mar 04 2026 10:00:00;20.1;0;null;0;0;null;null;null"));

        assert!(dir.path().join("public/stout/stout-2026-03-04.jsonl").exists());
        assert!(dir.path().join("public/stout/stout.csv").exists());
    }

    #[test]
    fn day_rollover_opens_a_new_structured_file() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        pipeline
            .start_session_on("ale", local(2026, 3, 4, 9).date_naive())
            .unwrap();

        let record = SampleRecord::zero();
        pipeline.append_at(&record, local(2026, 3, 4, 23)).unwrap();
        pipeline.append_at(&record, local(2026, 3, 5, 0)).unwrap();

        let day_one =
            fs::read_to_string(dir.path().join("data/ale/ale-2026-03-04.jsonl")).unwrap();
        let day_two =
            fs::read_to_string(dir.path().join("data/ale/ale-2026-03-05.jsonl")).unwrap();
        assert_eq!(day_one.lines().count(), 1);
        assert_eq!(day_two.lines().count(), 1);

        // the text log keeps accumulating in the same per-batch file
        let csv = fs::read_to_string(dir.path().join("data/ale/ale.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);
    }

    #[test]
    fn existing_target_gets_numeric_suffix() {
        let dir = tempdir().unwrap();
        let day = local(2026, 3, 4, 9).date_naive();
        let mut pipeline = pipeline(dir.path());
        pipeline.start_session_on("ipa", day).unwrap();
        pipeline.start_session_on("ipa", day).unwrap();
        pipeline.start_session_on("ipa", day).unwrap();

        assert!(dir.path().join("data/ipa/ipa-2026-03-04.jsonl").exists());
        assert!(dir.path().join("data/ipa/ipa-2026-03-04-1.jsonl").exists());
        assert_eq!(
            pipeline.current_json_path().unwrap(),
            dir.path().join("data/ipa/ipa-2026-03-04-2.jsonl")
        );
    }

    #[test]
    fn paused_and_stopped_skip_appends() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path());
        let day = local(2026, 3, 4, 9).date_naive();
        pipeline.start_session_on("porter", day).unwrap();

        pipeline.set_state(LogState::Paused);
        pipeline
            .append_at(&SampleRecord::zero(), local(2026, 3, 4, 10))
            .unwrap();
        let json =
            fs::read_to_string(dir.path().join("data/porter/porter-2026-03-04.jsonl")).unwrap();
        assert!(json.is_empty());

        // resume appends to the same file
        pipeline.set_state(LogState::Active);
        pipeline
            .append_at(&SampleRecord::zero(), local(2026, 3, 4, 11))
            .unwrap();
        let json =
            fs::read_to_string(dir.path().join("data/porter/porter-2026-03-04.jsonl")).unwrap();
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn inactive_pipeline_does_not_open_a_session() {
        let dir = tempdir().unwrap();
        let mut pipeline =
            LogPipeline::new(dir.path().join("data"), dir.path().join("public"), LogState::Stopped);
        pipeline
            .start_session_on("kolsch", local(2026, 3, 4, 9).date_naive())
            .unwrap();
        assert!(!dir.path().join("data/kolsch").exists());
    }
}

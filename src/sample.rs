use serde::Serialize;

/// One field of a sparse temperature frame: absent fields keep the prior
/// value, explicit nulls clear it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Cleared,
    Set(T),
}

impl<T: Clone> Patch<T> {
    pub fn apply_to(&self, slot: &mut Option<T>) {
        match self {
            Patch::Unchanged => {}
            Patch::Cleared => *slot = None,
            Patch::Set(value) => *slot = Some(value.clone()),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Patch::Unchanged)
    }
}

/// Decoded `T` frame payload: one patch per wire field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TempDelta {
    pub time: Patch<f64>,
    pub beer_temp: Patch<f64>,
    pub beer_set: Patch<f64>,
    pub beer_ann: Patch<String>,
    pub fridge_temp: Patch<f64>,
    pub fridge_set: Patch<f64>,
    pub fridge_ann: Patch<String>,
    pub room_temp: Patch<f64>,
    pub state: Patch<i64>,
}

impl TempDelta {
    pub fn is_empty(&self) -> bool {
        self.time.is_unchanged()
            && self.beer_temp.is_unchanged()
            && self.beer_set.is_unchanged()
            && self.beer_ann.is_unchanged()
            && self.fridge_temp.is_unchanged()
            && self.fridge_set.is_unchanged()
            && self.fridge_ann.is_unchanged()
            && self.room_temp.is_unchanged()
            && self.state.is_unchanged()
    }
}

/// The accumulated latest measurement: each field holds the most recent
/// value seen on the wire. Starts as the zero record and is mutated in
/// place on every decoded temperature frame; a copy appended to the logs
/// is never touched again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleRecord {
    #[serde(rename = "Time")]
    pub time: Option<f64>,
    #[serde(rename = "BeerTemp")]
    pub beer_temp: Option<f64>,
    #[serde(rename = "BeerSet")]
    pub beer_set: Option<f64>,
    #[serde(rename = "BeerAnn")]
    pub beer_ann: Option<String>,
    #[serde(rename = "FridgeTemp")]
    pub fridge_temp: Option<f64>,
    #[serde(rename = "FridgeSet")]
    pub fridge_set: Option<f64>,
    #[serde(rename = "FridgeAnn")]
    pub fridge_ann: Option<String>,
    #[serde(rename = "State")]
    pub state: Option<i64>,
    #[serde(rename = "RoomTemp")]
    pub room_temp: Option<f64>,
}

impl SampleRecord {
    /// The record in force before any frame arrives: temperatures and
    /// setpoints read zero, annotations and ambient are absent.
    pub fn zero() -> Self {
        Self {
            time: None,
            beer_temp: Some(0.0),
            beer_set: Some(0.0),
            beer_ann: None,
            fridge_temp: Some(0.0),
            fridge_set: Some(0.0),
            fridge_ann: None,
            state: None,
            room_temp: None,
        }
    }

    pub fn apply(&mut self, delta: &TempDelta) {
        delta.time.apply_to(&mut self.time);
        delta.beer_temp.apply_to(&mut self.beer_temp);
        delta.beer_set.apply_to(&mut self.beer_set);
        delta.beer_ann.apply_to(&mut self.beer_ann);
        delta.fridge_temp.apply_to(&mut self.fridge_temp);
        delta.fridge_set.apply_to(&mut self.fridge_set);
        delta.fridge_ann.apply_to(&mut self.fridge_ann);
        delta.room_temp.apply_to(&mut self.room_temp);
        delta.state.apply_to(&mut self.state);
    }

    /// One-line operator echo of the measured values.
    pub fn echo_line(&self) -> String {
        fn num(v: Option<f64>) -> String {
            v.map_or_else(|| "null".to_string(), |v| v.to_string())
        }
        format!(
            "beer {} (set {}), fridge {} (set {}), room {}, state {}",
            num(self.beer_temp),
            num(self.beer_set),
            num(self.fridge_temp),
            num(self.fridge_set),
            num(self.room_temp),
            self.state.map_or_else(|| "null".to_string(), |s| s.to_string()),
        )
    }
}

impl Default for SampleRecord {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_record_has_zero_readings() {
        let record = SampleRecord::zero();
        assert_eq!(record.beer_temp, Some(0.0));
        assert_eq!(record.fridge_set, Some(0.0));
        assert_eq!(record.beer_ann, None);
        assert_eq!(record.state, None);
    }

    #[test]
    fn apply_overwrites_only_present_fields() {
        let mut record = SampleRecord::zero();
        record.beer_ann = Some("heating".to_string());

        let delta = TempDelta {
            beer_temp: Patch::Set(20.1),
            state: Patch::Set(2),
            ..TempDelta::default()
        };
        record.apply(&delta);

        assert_eq!(record.beer_temp, Some(20.1));
        assert_eq!(record.state, Some(2));
        // untouched fields keep their prior values
        assert_eq!(record.beer_ann, Some("heating".to_string()));
        assert_eq!(record.fridge_temp, Some(0.0));
    }

    #[test]
    fn explicit_null_clears_a_field() {
        let mut record = SampleRecord::zero();
        record.fridge_ann = Some("cooling".to_string());

        let delta = TempDelta {
            fridge_ann: Patch::Cleared,
            ..TempDelta::default()
        };
        record.apply(&delta);
        assert_eq!(record.fridge_ann, None);
    }

    #[test]
    fn serializes_with_log_column_names() {
        let record = SampleRecord::zero();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["BeerTemp"], 0.0);
        assert!(json["RoomTemp"].is_null());
    }
}

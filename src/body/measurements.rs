//! Body measurements sent to the body-shape service.

use serde::{Deserialize, Serialize};

/// Flat set of body measurements in centimetres.
///
/// Fields are independent; nothing ties e.g. inseam to height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Measurements {
    pub height: f32,
    pub inseam: f32,
    pub chest: f32,
    pub waist: f32,
    pub hips: f32,
}

impl Default for Measurements {
    fn default() -> Self {
        Self {
            height: 175.0,
            inseam: 80.0,
            chest: 100.0,
            waist: 85.0,
            hips: 95.0,
        }
    }
}

impl Measurements {
    pub fn get(&self, key: MeasurementKey) -> f32 {
        match key {
            MeasurementKey::Height => self.height,
            MeasurementKey::Inseam => self.inseam,
            MeasurementKey::Chest => self.chest,
            MeasurementKey::Waist => self.waist,
            MeasurementKey::Hips => self.hips,
        }
    }

    pub fn set(&mut self, key: MeasurementKey, value: f32) {
        match key {
            MeasurementKey::Height => self.height = value,
            MeasurementKey::Inseam => self.inseam = value,
            MeasurementKey::Chest => self.chest = value,
            MeasurementKey::Waist => self.waist = value,
            MeasurementKey::Hips => self.hips = value,
        }
    }

    /// Copy with a single field replaced
    pub fn with(mut self, key: MeasurementKey, value: f32) -> Self {
        self.set(key, value);
        self
    }
}

/// One adjustable measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKey {
    Height,
    Inseam,
    Chest,
    Waist,
    Hips,
}

impl MeasurementKey {
    /// Slider order
    pub const ALL: [MeasurementKey; 5] = [
        Self::Height,
        Self::Inseam,
        Self::Chest,
        Self::Waist,
        Self::Hips,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Height => "Height",
            Self::Inseam => "Inseam",
            Self::Chest => "Chest",
            Self::Waist => "Waist",
            Self::Hips => "Hips",
        }
    }
}

impl std::fmt::Display for MeasurementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label().to_lowercase())
    }
}

/// Slider bounds shared by every measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderRange {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl Default for SliderRange {
    fn default() -> Self {
        Self {
            min: 50.0,
            max: 200.0,
            step: 1.0,
        }
    }
}

impl SliderRange {
    /// Clamp to the range and round to the nearest step
    pub fn snap(&self, value: f32) -> f32 {
        let stepped = self.min + ((value - self.min) / self.step).round() * self.step;
        stepped.clamp(self.min, self.max)
    }
}

/// Slider state: a pending value while dragging and the last committed set.
///
/// Only commits reach the body-shape service.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementDraft {
    committed: Measurements,
    pending: Measurements,
    range: SliderRange,
}

impl MeasurementDraft {
    pub fn new(initial: Measurements, range: SliderRange) -> Self {
        Self {
            committed: initial,
            pending: initial,
            range,
        }
    }

    pub fn committed(&self) -> &Measurements {
        &self.committed
    }

    pub fn pending(&self) -> &Measurements {
        &self.pending
    }

    pub fn range(&self) -> SliderRange {
        self.range
    }

    /// Update the displayed value only
    pub fn set_pending(&mut self, key: MeasurementKey, value: f32) {
        self.pending.set(key, self.range.snap(value));
    }

    /// Commit one field and return the full set to send
    pub fn commit(&mut self, key: MeasurementKey, value: f32) -> Measurements {
        let value = self.range.snap(value);
        self.committed = self.committed.with(key, value);
        self.pending.set(key, value);
        self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(Measurements::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "height": 175.0,
                "inseam": 80.0,
                "chest": 100.0,
                "waist": 85.0,
                "hips": 95.0,
            })
        );
    }

    #[test]
    fn test_with_changes_one_field() {
        let m = Measurements::default().with(MeasurementKey::Chest, 120.0);
        assert_eq!(m.chest, 120.0);
        assert_eq!(m.height, 175.0);
        assert_eq!(m.hips, 95.0);
    }

    #[test]
    fn test_snap() {
        let range = SliderRange::default();
        assert_eq!(range.snap(20.0), 50.0);
        assert_eq!(range.snap(250.0), 200.0);
        assert_eq!(range.snap(101.4), 101.0);
        assert_eq!(range.snap(101.6), 102.0);
    }

    #[test]
    fn test_pending_does_not_commit() {
        let mut draft = MeasurementDraft::new(Measurements::default(), SliderRange::default());
        draft.set_pending(MeasurementKey::Waist, 90.0);
        assert_eq!(draft.pending().waist, 90.0);
        assert_eq!(draft.committed().waist, 85.0);

        let sent = draft.commit(MeasurementKey::Waist, 92.0);
        assert_eq!(sent.waist, 92.0);
        assert_eq!(draft.committed().waist, 92.0);
        assert_eq!(draft.pending().waist, 92.0);
    }

    #[test]
    fn test_commit_keeps_other_committed_fields() {
        let mut draft = MeasurementDraft::new(Measurements::default(), SliderRange::default());
        // a drag on height that is never released must not leak into a chest commit
        draft.set_pending(MeasurementKey::Height, 160.0);
        let sent = draft.commit(MeasurementKey::Chest, 110.0);
        assert_eq!(sent.height, 175.0);
        assert_eq!(sent.chest, 110.0);
    }
}

//! BVH (Biovision Hierarchy) motion capture parser
//!
//! File layout:
//!   HIERARCHY
//!   ROOT <name> { OFFSET x y z  CHANNELS n <channel>...  JOINT ... | End Site { OFFSET x y z } }
//!   MOTION
//!   Frames: <count>
//!   Frame Time: <seconds>
//!   <one line of channel values per frame, joints in declaration order>
//!
//! Rotation channels are Euler angles in degrees, applied in the order they
//! are declared. Position channel values are added to the joint's offset.

use std::path::Path;

use glam::{Quat, Vec3};

use crate::error::{BvhError, MotionStageError};

/// One animatable channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl Channel {
    fn parse(token: &str, line: usize) -> Result<Self, BvhError> {
        match token.to_ascii_lowercase().as_str() {
            "xposition" => Ok(Self::Xposition),
            "yposition" => Ok(Self::Yposition),
            "zposition" => Ok(Self::Zposition),
            "xrotation" => Ok(Self::Xrotation),
            "yrotation" => Ok(Self::Yrotation),
            "zrotation" => Ok(Self::Zrotation),
            _ => Err(BvhError::UnknownChannel {
                line,
                channel: token.to_string(),
            }),
        }
    }
}

/// A joint of the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct BvhJoint {
    pub name: String,
    pub parent: Option<usize>,
    pub offset: Vec3,
    pub channels: Vec<Channel>,
    pub end_site: bool,
}

/// Local transform of one joint relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointTransform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl JointTransform {
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }
}

/// Parsed BVH animation
#[derive(Debug, Clone)]
pub struct BvhClip {
    joints: Vec<BvhJoint>,
    frame_time: f32,
    frames: Vec<Vec<JointTransform>>,
}

impl BvhClip {
    /// Load and parse a BVH file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MotionStageError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::parse(&text)?)
    }

    /// Parse BVH text
    pub fn parse(text: &str) -> Result<Self, BvhError> {
        Parser::new(text).parse()
    }

    pub fn joints(&self) -> &[BvhJoint] {
        &self.joints
    }

    /// Index of the first joint named `name`
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    /// Time of the last keyframe; playback loops at this point
    pub fn duration(&self) -> f32 {
        self.frames.len().saturating_sub(1) as f32 * self.frame_time
    }

    /// Offsets with identity rotations
    pub fn rest_pose(&self) -> Vec<JointTransform> {
        self.joints
            .iter()
            .map(|j| JointTransform {
                translation: j.offset,
                rotation: Quat::IDENTITY,
            })
            .collect()
    }

    /// Local transforms at `time`, looping and interpolating between frames
    pub fn sample(&self, time: f32) -> Vec<JointTransform> {
        match self.frames.len() {
            0 => return self.rest_pose(),
            1 => return self.frames[0].clone(),
            _ => {}
        }

        let duration = self.duration();
        let t = if time.is_finite() {
            time.rem_euclid(duration)
        } else {
            0.0
        };

        let position = t / self.frame_time;
        let last = self.frames.len() - 1;
        let i = (position.floor() as usize).min(last);
        let j = (i + 1).min(last);
        let alpha = (position - i as f32).clamp(0.0, 1.0);

        self.frames[i]
            .iter()
            .zip(&self.frames[j])
            .map(|(a, b)| a.lerp(b, alpha))
            .collect()
    }
}

#[derive(Clone, Copy)]
struct Token<'a> {
    line: usize,
    text: &'a str,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(i, line)| {
                line.split_whitespace()
                    .map(move |text| Token { line: i + 1, text })
            })
            .collect();
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<BvhClip, BvhError> {
        self.expect("HIERARCHY")?;

        let mut joints = Vec::new();
        while self.peek_is("ROOT") {
            self.pos += 1;
            self.parse_joint(None, &mut joints)?;
        }
        if joints.is_empty() {
            return Err(BvhError::EmptyHierarchy);
        }

        self.expect("MOTION")?;
        self.expect("Frames:")?;
        let declared = self.next_number("frame count")?;
        if declared < 0.0 || declared.fract() != 0.0 {
            return Err(BvhError::Unexpected {
                line: self.last_line(),
                expected: "frame count".to_string(),
                found: declared.to_string(),
            });
        }
        let declared = declared as usize;

        self.expect("Frame")?;
        self.expect("Time:")?;
        let frame_time = self.next_number("frame time")?;
        if frame_time.is_nan() || frame_time <= 0.0 {
            return Err(BvhError::FrameTime(frame_time));
        }

        let frames = self.parse_frames(&joints, declared)?;

        Ok(BvhClip {
            joints,
            frame_time,
            frames,
        })
    }

    fn parse_joint(
        &mut self,
        parent: Option<usize>,
        joints: &mut Vec<BvhJoint>,
    ) -> Result<(), BvhError> {
        let name = self.next("joint name")?.text.to_string();
        self.expect("{")?;
        let offset = self.parse_offset()?;

        let mut channels = Vec::new();
        if self.peek_is("CHANNELS") {
            self.pos += 1;
            let count = self.next_number("channel count")? as usize;
            for _ in 0..count {
                let token = self.next("channel name")?;
                channels.push(Channel::parse(token.text, token.line)?);
            }
        }

        let index = joints.len();
        joints.push(BvhJoint {
            name,
            parent,
            offset,
            channels,
            end_site: false,
        });

        loop {
            let token = self.next("JOINT, End Site or }")?;
            match token.text {
                "JOINT" => self.parse_joint(Some(index), joints)?,
                "End" => {
                    self.expect("Site")?;
                    self.expect("{")?;
                    let offset = self.parse_offset()?;
                    self.expect("}")?;
                    joints.push(BvhJoint {
                        name: format!("{}_End", joints[index].name),
                        parent: Some(index),
                        offset,
                        channels: Vec::new(),
                        end_site: true,
                    });
                }
                "}" => return Ok(()),
                other => {
                    return Err(BvhError::Unexpected {
                        line: token.line,
                        expected: "JOINT, End Site or }".to_string(),
                        found: other.to_string(),
                    })
                }
            }
        }
    }

    fn parse_offset(&mut self) -> Result<Vec3, BvhError> {
        self.expect("OFFSET")?;
        Ok(Vec3::new(
            self.next_number("offset x")?,
            self.next_number("offset y")?,
            self.next_number("offset z")?,
        ))
    }

    /// Each remaining line of values is one frame
    fn parse_frames(
        &mut self,
        joints: &[BvhJoint],
        declared: usize,
    ) -> Result<Vec<Vec<JointTransform>>, BvhError> {
        let expected: usize = joints.iter().map(|j| j.channels.len()).sum();
        // at most one frame per remaining token
        let mut frames = Vec::with_capacity(declared.min(self.tokens.len().saturating_sub(self.pos)));
        let mut values = Vec::with_capacity(expected);

        while self.pos < self.tokens.len() {
            let line = self.tokens[self.pos].line;
            values.clear();
            while let Some(token) = self.tokens.get(self.pos).filter(|t| t.line == line) {
                values.push(parse_number(token)?);
                self.pos += 1;
            }

            if frames.len() == declared {
                tracing::warn!(
                    "BVH has data past the declared {} frames, ignoring from line {}",
                    declared,
                    line
                );
                break;
            }
            if values.len() != expected {
                return Err(BvhError::ChannelCount {
                    frame: frames.len(),
                    expected,
                    found: values.len(),
                });
            }
            frames.push(frame_transforms(joints, &values));
        }

        if frames.len() < declared {
            return Err(BvhError::FrameCount {
                declared,
                found: frames.len(),
            });
        }

        Ok(frames)
    }

    fn next(&mut self, expected: &str) -> Result<Token<'a>, BvhError> {
        let token = *self
            .tokens
            .get(self.pos)
            .ok_or_else(|| BvhError::UnexpectedEof(expected.to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, keyword: &str) -> Result<(), BvhError> {
        let token = self.next(keyword)?;
        if token.text.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(BvhError::Unexpected {
                line: token.line,
                expected: keyword.to_string(),
                found: token.text.to_string(),
            })
        }
    }

    fn next_number(&mut self, expected: &str) -> Result<f32, BvhError> {
        let token = self.next(expected)?;
        parse_number(&token)
    }

    fn peek_is(&self, keyword: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|t| t.text.eq_ignore_ascii_case(keyword))
    }

    fn last_line(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.line)
    }
}

fn parse_number(token: &Token) -> Result<f32, BvhError> {
    token.text.parse::<f32>().map_err(|_| BvhError::BadNumber {
        line: token.line,
        value: token.text.to_string(),
    })
}

/// Convert one frame's channel values to local transforms
fn frame_transforms(joints: &[BvhJoint], values: &[f32]) -> Vec<JointTransform> {
    let mut cursor = values.iter().copied();
    joints
        .iter()
        .map(|joint| {
            let mut position = Vec3::ZERO;
            let mut rotation = Quat::IDENTITY;
            for channel in &joint.channels {
                let v = cursor.next().unwrap_or(0.0);
                match channel {
                    Channel::Xposition => position.x = v,
                    Channel::Yposition => position.y = v,
                    Channel::Zposition => position.z = v,
                    Channel::Xrotation => rotation *= Quat::from_rotation_x(v.to_radians()),
                    Channel::Yrotation => rotation *= Quat::from_rotation_y(v.to_radians()),
                    Channel::Zrotation => rotation *= Quat::from_rotation_z(v.to_radians()),
                }
            }
            JointTransform {
                translation: joint.offset + position,
                rotation,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const WALK: &str = "\
HIERARCHY
ROOT Hips
{
  OFFSET 0.0 90.0 0.0
  CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation
  JOINT Spine
  {
    OFFSET 0.0 10.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 5.0 0.0
    }
  }
  JOINT LeftUpLeg
  {
    OFFSET 8.0 -5.0 0.0
    CHANNELS 3 Zrotation Xrotation Yrotation
    End Site
    {
      OFFSET 0.0 -40.0 0.0
    }
  }
}
MOTION
Frames: 3
Frame Time: 0.5
0 0 0 0 0 0 0 0 0 0 0 0
10 0 0 0 90 0 0 0 0 0 0 0
20 0 0 0 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_parse_hierarchy() {
        let clip = BvhClip::parse(WALK).unwrap();
        let names: Vec<&str> = clip.joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Hips", "Spine", "Spine_End", "LeftUpLeg", "LeftUpLeg_End"]
        );
        assert_eq!(clip.joints()[3].parent, Some(0));
        assert_eq!(clip.joints()[4].parent, Some(3));
        assert!(clip.joints()[4].end_site);
        assert_eq!(clip.joints()[0].channels.len(), 6);
        assert_eq!(clip.joints()[3].offset, Vec3::new(8.0, -5.0, 0.0));
    }

    #[test]
    fn test_motion_header() {
        let clip = BvhClip::parse(WALK).unwrap();
        assert_eq!(clip.frame_count(), 3);
        assert_eq!(clip.frame_time(), 0.5);
        assert_eq!(clip.duration(), 1.0);
    }

    #[test]
    fn test_position_channels_add_to_offset() {
        let clip = BvhClip::parse(WALK).unwrap();
        let pose = clip.sample(0.5);
        assert_eq!(pose[0].translation, Vec3::new(10.0, 90.0, 0.0));
        // joints without position channels keep their offset
        assert_eq!(pose[1].translation, Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn test_rotation_in_degrees() {
        let clip = BvhClip::parse(WALK).unwrap();
        let pose = clip.sample(0.5);
        let expected = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        assert!(pose[0].rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn test_rotation_order_follows_channels() {
        let text = WALK.replace(
            "0 0 0 0 0 0 0 0 0 0 0 0\n10",
            "0 0 0 30 45 60 0 0 0 0 0 0\n10",
        );
        let clip = BvhClip::parse(&text).unwrap();
        let expected = Quat::from_rotation_z(30f32.to_radians())
            * Quat::from_rotation_x(45f32.to_radians())
            * Quat::from_rotation_y(60f32.to_radians());
        assert!(clip.sample(0.0)[0].rotation.angle_between(expected) < 1e-4);
    }

    #[test]
    fn test_sample_interpolates() {
        let clip = BvhClip::parse(WALK).unwrap();
        let pose = clip.sample(0.75);
        assert!((pose[0].translation.x - 15.0).abs() < 1e-4);
        let expected = Quat::from_rotation_x(std::f32::consts::FRAC_PI_4);
        assert!(pose[0].rotation.angle_between(expected) < 1e-3);
    }

    #[test]
    fn test_sample_loops() {
        let clip = BvhClip::parse(WALK).unwrap();
        let a = clip.sample(0.25);
        let b = clip.sample(1.25);
        assert!((a[0].translation - b[0].translation).length() < 1e-4);
        assert!((clip.sample(-0.75)[0].translation.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_rest_pose() {
        let clip = BvhClip::parse(WALK).unwrap();
        let rest = clip.rest_pose();
        assert_eq!(rest[0].translation, Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(rest[2].translation, Vec3::new(0.0, 5.0, 0.0));
        assert!(rest.iter().all(|t| t.rotation == Quat::IDENTITY));
    }

    #[test]
    fn test_channel_count_mismatch() {
        let text = WALK.replace("20 0 0 0 0 0 0 0 0 0 0 0", "20 0 0");
        assert_eq!(
            BvhClip::parse(&text).unwrap_err(),
            BvhError::ChannelCount {
                frame: 2,
                expected: 12,
                found: 3
            }
        );
    }

    #[test]
    fn test_missing_frames() {
        let text = WALK.replace("Frames: 3", "Frames: 5");
        assert_eq!(
            BvhClip::parse(&text).unwrap_err(),
            BvhError::FrameCount {
                declared: 5,
                found: 3
            }
        );
    }

    #[test]
    fn test_huge_frame_count_is_an_error() {
        let text = WALK.replace("Frames: 3", "Frames: 1000000000000000000");
        assert!(matches!(
            BvhClip::parse(&text).unwrap_err(),
            BvhError::FrameCount { found: 3, .. }
        ));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let text = WALK.replace("OFFSET 8.0 -5.0 0.0", "OFFSET 8.0 abc 0.0");
        assert_eq!(
            BvhClip::parse(&text).unwrap_err(),
            BvhError::BadNumber {
                line: 17,
                value: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_channel() {
        // first three-channel joint is Spine, declared on line 9
        let text = WALK.replacen("Zrotation Xrotation Yrotation", "Zrotation Wrotation Yrotation", 1);
        assert!(matches!(
            BvhClip::parse(&text),
            Err(BvhError::UnknownChannel { line: 9, .. })
        ));
    }

    #[test]
    fn test_zero_frame_time() {
        let text = WALK.replace("Frame Time: 0.5", "Frame Time: 0");
        assert_eq!(BvhClip::parse(&text).unwrap_err(), BvhError::FrameTime(0.0));
    }

    #[test]
    fn test_missing_hierarchy() {
        assert!(matches!(
            BvhClip::parse("MOTION\nFrames: 0\n"),
            Err(BvhError::Unexpected { line: 1, .. })
        ));
        assert_eq!(
            BvhClip::parse("HIERARCHY\nMOTION\n").unwrap_err(),
            BvhError::EmptyHierarchy
        );
    }

    #[test]
    fn test_truncated_file() {
        let text = "HIERARCHY\nROOT Hips\n{\n  OFFSET 0 0";
        assert!(matches!(
            BvhClip::parse(text),
            Err(BvhError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.bvh");
        std::fs::write(&path, WALK).unwrap();
        let clip = BvhClip::load(&path).unwrap();
        assert_eq!(clip.joints().len(), 5);
    }
}

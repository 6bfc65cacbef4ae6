//! Skeletal animation: BVH clips, playback and retargeting

pub mod bvh;
pub mod player;
pub mod retarget;

pub use bvh::{BvhClip, BvhJoint, Channel, JointTransform};
pub use player::{BvhPose, ClipPlayer};
pub use retarget::{strip_prefix, RetargetMap};

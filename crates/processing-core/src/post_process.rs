//! Clip post-processing: flatten flicker and over-segmentation.
//!
//! Both passes are single left-to-right sweeps that only ever extend an
//! already-kept clip, so ordering and contiguity are preserved.

use reframe_project_model::clip::VideoClip;

/// Absorb clips shorter than `min_duration` into a neighbour.
///
/// - A short current clip extends the previous kept clip, which keeps its
///   own framing.
/// - Otherwise, if the previous kept clip is itself short, it is extended
///   over the current clip and takes the current clip's framing.
///
/// The first clip always seeds the output.
pub fn merge_short(clips: Vec<VideoClip>, min_duration: f64) -> Vec<VideoClip> {
    let mut merged: Vec<VideoClip> = Vec::with_capacity(clips.len());

    for clip in clips {
        let Some(prev) = merged.last_mut() else {
            merged.push(clip);
            continue;
        };

        if clip.duration() < min_duration {
            prev.end_time = clip.end_time;
        } else if prev.duration() < min_duration {
            prev.end_time = clip.end_time;
            prev.take_framing_from(&clip);
        } else {
            merged.push(clip);
        }
    }

    merged
}

/// Merge neighbouring clips whose crop windows barely differ.
///
/// A clip is folded into the last kept clip when both share
/// `use_full_frame` and their crop positions are closer than
/// `position_threshold`. The earlier clip's framing is kept.
pub fn merge_similar_position(clips: Vec<VideoClip>, position_threshold: f64) -> Vec<VideoClip> {
    let mut merged: Vec<VideoClip> = Vec::with_capacity(clips.len());

    for clip in clips {
        if let Some(kept) = merged.last_mut() {
            let close =
                kept.crop_position.distance_to(&clip.crop_position) < position_threshold;
            if close && kept.use_full_frame == clip.use_full_frame {
                kept.end_time = clip.end_time;
                continue;
            }
        }
        merged.push(clip);
    }

    merged
}

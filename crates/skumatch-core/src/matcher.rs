use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::MatchConfig;
use crate::model::{BBox, PositionedImage, RecognizedCode};

/// One code paired with one image, by index into the page's inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub code_index: usize,
    pub image_index: usize,
    pub distance: f32,
}

/// Result of matching one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMatch {
    /// Sorted by code index.
    pub assignments: Vec<Assignment>,
    /// Non-dependent codes that received no image, in code order.
    pub unmatched: Vec<usize>,
}

/// Pair the page's codes with its images, nearest first.
///
/// Every eligible (code, image) pair is ranked by distance, ties going to the
/// earlier code and then the earlier image in reading order. Pairs are taken
/// greedily while both sides are unclaimed, so each code gets at most one
/// image and each image goes to at most one code. Dependent codes never take
/// part.
pub fn match_page(
    codes: &[RecognizedCode],
    images: &[PositionedImage],
    config: &MatchConfig,
) -> PageMatch {
    let mut candidates: Vec<Assignment> = Vec::new();
    for (code_index, code) in codes.iter().enumerate() {
        if code.is_dependent {
            continue;
        }
        for (image_index, image) in images.iter().enumerate() {
            if let Some(distance) = pair_distance(&code.bbox, &image.bbox, config) {
                candidates.push(Assignment {
                    code_index,
                    image_index,
                    distance,
                });
            }
        }
    }
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.code_index.cmp(&b.code_index))
            .then(a.image_index.cmp(&b.image_index))
    });

    let mut claimed_codes = HashSet::new();
    let mut claimed_images = HashSet::new();
    let mut assignments = Vec::new();
    for candidate in candidates {
        if claimed_codes.contains(&candidate.code_index)
            || claimed_images.contains(&candidate.image_index)
        {
            continue;
        }
        claimed_codes.insert(candidate.code_index);
        claimed_images.insert(candidate.image_index);
        assignments.push(candidate);
    }
    assignments.sort_by_key(|a| a.code_index);

    let unmatched = codes
        .iter()
        .enumerate()
        .filter(|(i, code)| !code.is_dependent && !claimed_codes.contains(i))
        .map(|(i, _)| i)
        .collect();

    PageMatch {
        assignments,
        unmatched,
    }
}

/// Center distance from a code to an image, or `None` when the pair is
/// ineligible: the image center sits above the code's row by more than the
/// vertical tolerance, or the pair is further apart than `max_distance`.
pub fn pair_distance(code: &BBox, image: &BBox, config: &MatchConfig) -> Option<f32> {
    let (cx, cy) = code.center();
    let (ix, iy) = image.center();
    if iy < code.top - config.vertical_tolerance {
        return None;
    }
    let dx = (ix - cx) * config.horizontal_weight;
    let dy = iy - cy;
    let distance = (dx * dx + dy * dy).sqrt();
    match config.max_distance {
        Some(max) if distance > max => None,
        _ => Some(distance),
    }
}

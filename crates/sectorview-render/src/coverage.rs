//! Sector visibility estimation from a coverage render readback.
//!
//! Sector bounds are drawn into an offscreen RGBA8 target cleared to
//! white. Each covered pixel encodes a model-offset sector id in RGB
//! (`b + g*255 + r*255*255`) and the distance to the camera in alpha.

use std::collections::HashMap;

use sectorview_core::constants::{
    COVERAGE_EMPTY_CHANNEL, COVERAGE_RENDER_TARGET_SCALE, MIN_COVERAGE_TARGET_SIZE,
};

/// Accumulated visibility of one sector across the coverage image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectorVisibility {
    /// Sector id plus the offset of the model it belongs to.
    pub sector_id_with_offset: u32,
    /// Sum of per-pixel weights; pixels near the centre count more.
    pub weight: f32,
    /// Smallest encoded distance seen for this sector.
    pub distance: u8,
}

/// Visible sector with its share of the total coverage weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrioritizedSector {
    pub sector_id_with_offset: u32,
    /// Fraction of the total weight, in (0, 1].
    pub priority: f32,
    pub distance: u8,
}

/// Coverage render target size for a given full render size.
pub fn coverage_target_size(render_width: u32, render_height: u32) -> (u32, u32) {
    let scale = |v: u32| ((v as f32 * COVERAGE_RENDER_TARGET_SCALE).floor() as u32).max(MIN_COVERAGE_TARGET_SIZE);
    (scale(render_width), scale(render_height))
}

/// Weight of a pixel at normalised screen coordinates in [-1, 1].
pub fn pixel_weight(x: f32, y: f32) -> f32 {
    let s = x * x + y * y;
    0.5 * (2.5 - s) + (-s.sqrt()).exp()
}

/// Decode an RGBA8 readback into per-sector visibility, unordered.
pub fn unpack_sector_visibility(width: u32, height: u32, rgba: &[u8]) -> Vec<SectorVisibility> {
    let mut visibility: HashMap<u32, SectorVisibility> = HashMap::new();
    let half_width = width as f32 / 2.0;
    let half_height = height as f32 / 2.0;

    let pixel_count = (width as usize * height as usize).min(rgba.len() / 4);
    let pixels: &[[u8; 4]] = bytemuck::cast_slice(&rgba[..pixel_count * 4]);

    for (i, &[r, g, b, distance]) in pixels.iter().enumerate() {
        if r == COVERAGE_EMPTY_CHANNEL && g == COVERAGE_EMPTY_CHANNEL && b == COVERAGE_EMPTY_CHANNEL {
            continue;
        }

        let x = (i % width as usize) as f32;
        let y = (i / width as usize) as f32;
        let rx = (x - half_width) / half_width;
        let ry = (y - half_height) / half_height;

        let id = b as u32 + g as u32 * 255 + r as u32 * 255 * 255;
        let entry = visibility.entry(id).or_insert(SectorVisibility {
            sector_id_with_offset: id,
            weight: 0.0,
            distance,
        });
        entry.weight += pixel_weight(rx, ry);
        entry.distance = entry.distance.min(distance);
    }

    visibility.into_values().collect()
}

/// Visible sectors, most covered first, with normalised priorities.
pub fn prioritize_sectors(visibility: &[SectorVisibility]) -> Vec<PrioritizedSector> {
    let total_weight: f32 = visibility.iter().map(|v| v.weight).sum();
    let mut visible: Vec<&SectorVisibility> = visibility.iter().filter(|v| v.weight > 0.0).collect();
    visible.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.sector_id_with_offset.cmp(&b.sector_id_with_offset))
    });

    visible
        .into_iter()
        .map(|v| PrioritizedSector {
            sector_id_with_offset: v.sector_id_with_offset,
            priority: v.weight / total_weight,
            distance: v.distance,
        })
        .collect()
}

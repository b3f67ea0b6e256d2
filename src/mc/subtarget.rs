// This module describes the GPU subtarget the expression evaluator asks scalar questions
// of. SubtargetInfo is the seam: the evaluator only ever queries max waves per execution
// unit, the VGPR allocation granule, the total VGPR count, the hardware generation, the
// extended register file (gfx90a) feature, and the two features that change the extra
// SGPR count. GcnSubtarget is a plain configuration record implementing that trait, with
// presets for a handful of processors selectable by name. The isa_info functions are the
// closed-form register/occupancy tables that the target expression kinds fold over.

//! Subtarget description and GCN ISA tables.

use std::fmt;

/// Hardware generation. The numbering matters: the tables compare
/// generations numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum Generation {
    SouthernIslands = 4,
    SeaIslands = 5,
    VolcanicIslands = 6,
    Gfx9 = 7,
    Gfx10 = 8,
    Gfx11 = 9,
    Gfx12 = 10,
}

impl Generation {
    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Major ISA version of the generation.
    pub fn isa_major(self) -> u32 {
        match self {
            Generation::SouthernIslands => 6,
            Generation::SeaIslands => 7,
            Generation::VolcanicIslands => 8,
            Generation::Gfx9 => 9,
            Generation::Gfx10 => 10,
            Generation::Gfx11 => 11,
            Generation::Gfx12 => 12,
        }
    }
}

/// Scalar queries the evaluator makes of its target.
pub trait SubtargetInfo {
    fn generation(&self) -> Generation;

    fn max_waves_per_eu(&self) -> u32;

    fn vgpr_alloc_granule(&self) -> u32;

    fn total_num_vgprs(&self) -> u32;

    /// Unified VGPR/AGPR register file (gfx90a and later CDNA parts).
    fn has_gfx90a_insts(&self) -> bool;

    fn has_architected_flat_scratch(&self) -> bool;

    fn isa_major(&self) -> u32 {
        self.generation().isa_major()
    }
}

/// Configuration record describing one GCN processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcnSubtarget {
    pub name: String,
    pub generation: Generation,
    pub gfx90a_insts: bool,
    pub architected_flat_scratch: bool,
    pub max_waves_per_eu: u32,
    pub vgpr_alloc_granule: u32,
    pub total_num_vgprs: u32,
}

impl GcnSubtarget {
    /// Processor names accepted by [`GcnSubtarget::from_cpu`].
    pub const KNOWN_CPUS: &'static [&'static str] =
        &["gfx700", "gfx803", "gfx900", "gfx90a", "gfx940", "gfx1030", "gfx1100"];

    /// Look up a preset by processor name.
    pub fn from_cpu(cpu: &str) -> Option<Self> {
        let (generation, gfx90a_insts, architected_flat_scratch, max_waves, granule, total) =
            match cpu {
                "gfx700" => (Generation::SeaIslands, false, false, 10, 4, 256),
                "gfx803" => (Generation::VolcanicIslands, false, false, 10, 4, 256),
                "gfx900" => (Generation::Gfx9, false, false, 10, 4, 256),
                "gfx90a" => (Generation::Gfx9, true, false, 8, 8, 512),
                "gfx940" => (Generation::Gfx9, true, true, 8, 8, 512),
                "gfx1030" => (Generation::Gfx10, false, false, 16, 8, 1024),
                "gfx1100" => (Generation::Gfx11, false, true, 16, 8, 1536),
                _ => return None,
            };
        Some(Self {
            name: cpu.to_string(),
            generation,
            gfx90a_insts,
            architected_flat_scratch,
            max_waves_per_eu: max_waves,
            vgpr_alloc_granule: granule,
            total_num_vgprs: total,
        })
    }
}

impl Default for GcnSubtarget {
    fn default() -> Self {
        Self {
            name: "gfx900".to_string(),
            generation: Generation::Gfx9,
            gfx90a_insts: false,
            architected_flat_scratch: false,
            max_waves_per_eu: 10,
            vgpr_alloc_granule: 4,
            total_num_vgprs: 256,
        }
    }
}

impl fmt::Display for GcnSubtarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl SubtargetInfo for GcnSubtarget {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn max_waves_per_eu(&self) -> u32 {
        self.max_waves_per_eu
    }

    fn vgpr_alloc_granule(&self) -> u32 {
        self.vgpr_alloc_granule
    }

    fn total_num_vgprs(&self) -> u32 {
        self.total_num_vgprs
    }

    fn has_gfx90a_insts(&self) -> bool {
        self.gfx90a_insts
    }

    fn has_architected_flat_scratch(&self) -> bool {
        self.architected_flat_scratch
    }
}

/// Round `value` up to a multiple of `align`. `align` must be non-zero.
pub fn align_to(value: u64, align: u64) -> u64 {
    debug_assert!(align != 0, "Align can't be 0.");
    value.wrapping_add(align - 1) / align * align
}

pub mod isa_info {
    use super::{align_to, Generation, SubtargetInfo};

    /// SGPRs reserved on top of the ones a kernel uses directly.
    pub fn num_extra_sgprs(
        sti: &dyn SubtargetInfo,
        vcc_used: bool,
        flat_scr_used: bool,
        xnack_used: bool,
    ) -> u32 {
        let mut extra = if vcc_used { 2 } else { 0 };

        let major = sti.isa_major();
        if major >= 10 {
            return extra;
        }

        if major < 8 {
            if flat_scr_used {
                extra = 4;
            }
        } else {
            if xnack_used {
                extra = 4;
            }
            if flat_scr_used || sti.has_architected_flat_scratch() {
                extra = 6;
            }
        }
        extra
    }

    /// Waves per EU that fit with `sgprs` scalar registers each.
    pub fn occupancy_with_num_sgprs(sgprs: u32, max_waves: u32, generation: u32) -> u32 {
        if generation >= Generation::Gfx10.as_raw() {
            return max_waves;
        }

        if generation >= Generation::VolcanicIslands.as_raw() {
            return match sgprs {
                0..=80 => 10,
                81..=88 => 9,
                89..=100 => 8,
                _ => 7,
            };
        }

        match sgprs {
            0..=48 => 10,
            49..=56 => 9,
            57..=64 => 8,
            65..=72 => 7,
            73..=80 => 6,
            _ => 5,
        }
    }

    /// Waves per EU that fit with `vgprs` vector registers each.
    pub fn num_waves_per_eu_with_num_vgprs(
        vgprs: u32,
        granule: u32,
        max_waves: u32,
        total_num_vgprs: u32,
    ) -> u32 {
        if granule == 0 || vgprs < granule {
            return max_waves;
        }
        // Rounded in 64 bits: a count near u32::MAX rounds past it.
        let rounded = align_to(vgprs.into(), granule.into());
        let waves = u64::from(total_num_vgprs) / rounded;
        (waves as u32).max(1).min(max_waves)
    }
}

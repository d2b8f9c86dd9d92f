pub mod assembler;

use serde::{Deserialize, Serialize};

pub use assembler::{assemble, aspect_ratio_class, AssembledRequest, PromptInputs};

/// The four generation modes of the studio. Each mode keys a fixed pair of
/// clause strings (fidelity + closing quality) so the compiler checks that
/// every mode is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenerationMode {
    Portrait,
    Object,
    Enhance,
    Expert,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::Portrait => "PORTRAIT",
            GenerationMode::Object => "OBJECT",
            GenerationMode::Enhance => "ENHANCE",
            GenerationMode::Expert => "EXPERT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "PORTRAIT" => Some(GenerationMode::Portrait),
            "OBJECT" => Some(GenerationMode::Object),
            "ENHANCE" => Some(GenerationMode::Enhance),
            "EXPERT" => Some(GenerationMode::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModeClauses {
    pub fidelity: &'static str,
    pub closing: &'static str,
}

pub fn mode_clauses(mode: GenerationMode) -> ModeClauses {
    match mode {
        GenerationMode::Portrait => ModeClauses {
            fidelity: "Preserve the subject's facial identity exactly as captured in the subject \
                       photo; do not alter facial structure, skin tone, or expression.",
            closing: "Final image must look like a premium professional portrait: crisp focus on \
                      the face, natural skin texture, no artifacts.",
        },
        GenerationMode::Object => ModeClauses {
            fidelity: "Reproduce the product exactly as captured in the subject photo; do not \
                       alter its shape, materials, label text, or proportions.",
            closing: "Final image must look like a high-end product shot: clean edges, accurate \
                      colors, no warping or invented details.",
        },
        GenerationMode::Enhance => ModeClauses {
            fidelity: "Enhance the existing image in place; keep the composition, framing, and \
                       every subject unchanged while improving lighting and clarity.",
            closing: "Final image must read as the same photograph, only better: no added \
                      elements, no relocation, no identity drift.",
        },
        GenerationMode::Expert => ModeClauses {
            fidelity: "Portray the expert with flattering, professional polish; subtle grooming \
                       and wardrobe upgrades are permitted while keeping the person recognizable.",
            closing: "Final image must look like an authoritative personal-brand photo: \
                      confident, editorial quality, magazine-grade lighting.",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectPosition {
    Left,
    Center,
    Right,
}

impl SubjectPosition {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "LEFT" => Some(SubjectPosition::Left),
            "CENTER" => Some(SubjectPosition::Center),
            "RIGHT" => Some(SubjectPosition::Right),
            _ => None,
        }
    }
}

pub fn position_clause(position: SubjectPosition) -> &'static str {
    match position {
        SubjectPosition::Left => {
            "Position the subject with its center at 33% from the left edge; the subject must \
             not touch the frame edges and must not sit dead center."
        }
        SubjectPosition::Center => {
            "Position the subject centered horizontally with comfortable margin on both sides."
        }
        SubjectPosition::Right => {
            "Position the subject with its center at 66% from the left edge; the subject must \
             not touch the frame edges and must not sit dead center."
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationAttributes {
    pub use_gradient: bool,
    pub use_blur: bool,
    pub use_main_color: bool,
    pub main_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ColorPalette {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
}

use crate::llm::media::MediaFile;
use crate::prompt::{
    mode_clauses, position_clause, ColorPalette, GenerationAttributes, GenerationMode,
    SubjectPosition,
};
use crate::workspace::references::ReferenceItem;

/// One fully assembled generation request: ordered image segments plus the
/// single composed instruction text. Built fresh per call, never persisted.
#[derive(Debug, Clone)]
pub struct AssembledRequest {
    pub mode: GenerationMode,
    pub images: Vec<MediaFile>,
    pub text: String,
    pub aspect_ratio: &'static str,
}

#[derive(Debug)]
pub struct PromptInputs<'a> {
    pub mode: GenerationMode,
    pub subjects: &'a [MediaFile],
    pub references: &'a [ReferenceItem],
    pub assets: &'a [MediaFile],
    pub attributes: &'a GenerationAttributes,
    pub palette: Option<&'a ColorPalette>,
    pub position: SubjectPosition,
    pub user_instructions: &'a str,
    pub target_width: u32,
    pub target_height: u32,
}

/// Coarse quantization of target dimensions into the five canonical aspect
/// classes the generation service accepts. Total over every positive pair.
pub fn aspect_ratio_class(width: u32, height: u32) -> &'static str {
    let ratio = width as f64 / height as f64;
    if ratio > 1.5 {
        "16:9"
    } else if ratio > 1.2 {
        "4:3"
    } else if ratio > 0.9 {
        "1:1"
    } else if ratio > 0.7 {
        "3:4"
    } else {
        "9:16"
    }
}

fn gradient_clause(attributes: &GenerationAttributes) -> String {
    match attributes
        .main_color
        .as_deref()
        .filter(|_| attributes.use_main_color)
    {
        Some(color) => format!(
            "Blend the background into a smooth soft gradient built around the main color {}.",
            color
        ),
        None => "Blend the background into a smooth soft gradient.".to_string(),
    }
}

const BLUR_CLAUSE: &str = "Apply a gentle rack-focus blur to the background while keeping the \
                           subject tack sharp.";
const KEEP_SHARP_CLAUSE: &str = "Keep the entire scene uniformly sharp with no background blur.";

/// Deterministically composes the request segments for one generation call.
///
/// Segment order: subject images, environment references in priority order,
/// secondary assets, then exactly one text segment. The text is a fixed-order
/// concatenation of clauses; identical inputs yield byte-identical output.
/// Batch variation suffixes are appended per request by the orchestrator,
/// outside this function.
pub fn assemble(inputs: &PromptInputs<'_>) -> AssembledRequest {
    let mut images = Vec::new();
    images.extend(inputs.subjects.iter().cloned());
    images.extend(inputs.references.iter().map(|item| item.image.clone()));
    images.extend(inputs.assets.iter().cloned());

    let aspect_ratio = aspect_ratio_class(inputs.target_width, inputs.target_height);
    let clauses = mode_clauses(inputs.mode);

    let mut sections: Vec<String> = Vec::new();
    sections.push(format!(
        "Task: generate a {} marketing image at {}x{}.",
        aspect_ratio, inputs.target_width, inputs.target_height
    ));
    sections.push(clauses.fidelity.to_string());

    if !inputs.references.is_empty() {
        sections.push(format!(
            "Synthesize lighting, mood, and environment from the {} reference image(s) that \
             follow the subject; use them for style only, never for identity.",
            inputs.references.len()
        ));
        for (index, reference) in inputs.references.iter().enumerate() {
            let description = reference.description.trim();
            if !description.is_empty() {
                sections.push(format!("Reference {}: {}.", index + 1, description));
            }
        }
    }

    sections.push(position_clause(inputs.position).to_string());

    if inputs.attributes.use_gradient {
        sections.push(gradient_clause(inputs.attributes));
    }
    if inputs.attributes.use_blur {
        sections.push(BLUR_CLAUSE.to_string());
    } else {
        sections.push(KEEP_SHARP_CLAUSE.to_string());
    }

    if inputs.mode == GenerationMode::Expert {
        if let Some(palette) = inputs.palette {
            sections.push(format!(
                "Use the brand palette: primary {}, secondary {}, accent {}.",
                palette.primary, palette.secondary, palette.accent
            ));
        }
    }

    if !inputs.assets.is_empty() {
        sections.push(
            "Integrate the supplied secondary assets (logos, graphics) naturally into the \
             composition without distorting them."
                .to_string(),
        );
    }

    let instructions = inputs.user_instructions.trim();
    if !instructions.is_empty() {
        sections.push(instructions.to_string());
    }

    sections.push(clauses.closing.to_string());

    AssembledRequest {
        mode: inputs.mode,
        images,
        text: sections.join(" "),
        aspect_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(byte: u8) -> MediaFile {
        MediaFile::new(vec![byte], "image/png".to_string(), None)
    }

    fn base_inputs<'a>(
        mode: GenerationMode,
        subjects: &'a [MediaFile],
        references: &'a [ReferenceItem],
        assets: &'a [MediaFile],
        attributes: &'a GenerationAttributes,
    ) -> PromptInputs<'a> {
        PromptInputs {
            mode,
            subjects,
            references,
            assets,
            attributes,
            palette: None,
            position: SubjectPosition::Center,
            user_instructions: "",
            target_width: 1920,
            target_height: 1080,
        }
    }

    #[test]
    fn aspect_bucketing_maps_canonical_sizes() {
        assert_eq!(aspect_ratio_class(1920, 1080), "16:9");
        assert_eq!(aspect_ratio_class(1080, 1920), "9:16");
        assert_eq!(aspect_ratio_class(1024, 1024), "1:1");
        assert_eq!(aspect_ratio_class(1400, 1050), "4:3");
        assert_eq!(aspect_ratio_class(1050, 1400), "3:4");
    }

    #[test]
    fn aspect_bucketing_is_total_over_extreme_pairs() {
        let classes = ["16:9", "4:3", "1:1", "3:4", "9:16"];
        for (width, height) in [(1, 10_000), (10_000, 1), (1, 1), (7, 5), (5, 7)] {
            assert!(classes.contains(&aspect_ratio_class(width, height)));
        }
    }

    #[test]
    fn identical_inputs_assemble_byte_identical_text() {
        let subjects = [png(1)];
        let references = [ReferenceItem::from_parts(png(2), "warm studio light")];
        let assets = [png(3)];
        let attributes = GenerationAttributes {
            use_gradient: true,
            use_blur: true,
            use_main_color: true,
            main_color: Some("#ff6600".to_string()),
        };
        let inputs = base_inputs(
            GenerationMode::Portrait,
            &subjects,
            &references,
            &assets,
            &attributes,
        );

        let first = assemble(&inputs);
        let second = assemble(&inputs);
        assert_eq!(first.text, second.text);
        assert_eq!(first.images.len(), second.images.len());
    }

    #[test]
    fn segments_keep_subject_reference_asset_order() {
        let subjects = [png(1), png(2)];
        let references = [
            ReferenceItem::from_parts(png(3), ""),
            ReferenceItem::from_parts(png(4), ""),
        ];
        let assets = [png(5)];
        let attributes = GenerationAttributes::default();
        let inputs = base_inputs(
            GenerationMode::Object,
            &subjects,
            &references,
            &assets,
            &attributes,
        );

        let assembled = assemble(&inputs);
        let order: Vec<u8> = assembled.images.iter().map(|image| image.bytes[0]).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn object_right_gradient_scenario() {
        let subjects = [png(1)];
        let attributes = GenerationAttributes {
            use_gradient: true,
            use_blur: false,
            use_main_color: false,
            main_color: None,
        };
        let mut inputs = base_inputs(GenerationMode::Object, &subjects, &[], &[], &attributes);
        inputs.position = SubjectPosition::Right;

        let assembled = assemble(&inputs);
        assert!(assembled.text.contains("Reproduce the product exactly"));
        assert!(assembled.text.contains("66% from the left edge"));
        assert!(assembled.text.contains("smooth soft gradient"));
        assert!(!assembled.text.contains("rack-focus blur"));
        assert!(assembled.text.contains(KEEP_SHARP_CLAUSE));
    }

    #[test]
    fn palette_clause_only_for_expert_mode() {
        let subjects = [png(1)];
        let attributes = GenerationAttributes::default();
        let palette = ColorPalette {
            primary: "navy".to_string(),
            secondary: "cream".to_string(),
            accent: "gold".to_string(),
        };

        let mut expert = base_inputs(GenerationMode::Expert, &subjects, &[], &[], &attributes);
        expert.palette = Some(&palette);
        assert!(assemble(&expert)
            .text
            .contains("primary navy, secondary cream, accent gold"));

        let mut portrait = base_inputs(GenerationMode::Portrait, &subjects, &[], &[], &attributes);
        portrait.palette = Some(&palette);
        assert!(!assemble(&portrait).text.contains("primary navy"));
    }

    #[test]
    fn user_instructions_appear_verbatim_before_closing_clause() {
        let subjects = [png(1)];
        let attributes = GenerationAttributes::default();
        let mut inputs = base_inputs(GenerationMode::Enhance, &subjects, &[], &[], &attributes);
        inputs.user_instructions = "make the sky a deep twilight blue";

        let text = assemble(&inputs).text;
        let instructions_at = text.find("make the sky a deep twilight blue").unwrap();
        let closing_at = text.find("Final image must read as the same photograph").unwrap();
        assert!(instructions_at < closing_at);
    }
}

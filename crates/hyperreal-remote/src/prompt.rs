//! Instruction composition for the four remote operations.
//!
//! The synthesis instruction is the load-bearing one: the sketch is declared
//! the only geometry authority and the identity references are demoted to
//! feature sources, which is what keeps a reference photo's own camera angle
//! from leaking into the output.

use serde::{Deserialize, Serialize};

use crate::options::StyleMode;
use crate::SynthesisRequest;

/// Appended to every synthesis instruction regardless of style.
pub const GLOBAL_NEGATIVE_PROMPT: &str = "same pose, repetitive angle, stiff posture, mugshot, passport photo, looking at camera (unless specified), deformed hands, plastic skin, 3d render, cartoon, anime, illustration, bad anatomy, blur, low quality, grayscale, monochrome (unless specified), text, watermark";

const RAW_NEGATIVE_PROMPT: &str = "cartoon, drawing, illustration, 3d render, plastic skin, airbrushed, neon, fantasy, sci-fi, cyberpunk, makeup, text, watermark, border, frame, split screen, multiple views, collage, deformed hands";

const POLISHED_NEGATIVE_PROMPT: &str =
    "cartoon, illustration, low quality, blurry, text, watermark, border, frame, split screen, multiple views";

/// Instruction for the quality judge. The reply is expected to be one integer.
pub const JUDGE_INSTRUCTION: &str = "\
Act as a strict photography curator for a LoRA training dataset.
Analyze this image and rate it from 1 to 10 based on these criteria:
1. Anatomical Correctness (Hands, eyes, limbs must be perfect).
2. Face Clarity (Sharp focus, distinct features).
3. Photorealism (Lighting, texture).

If the image has deformed hands, extra fingers, or blurred face, score it below 5.

OUTPUT FORMAT: Just return the single number (integer). Example: 8";

/// Which identity reference should dominate for a given scene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityFocus {
    /// Front view mapped onto the sketch's 3D structure.
    #[default]
    Front,
    /// Nose and jaw copied from the profile references.
    Profile,
    /// Teeth, mouth shape and eye crinkles from the expression reference.
    Expression,
    /// Hair volume and shoulders; no face is forced into view.
    BackView,
}

impl IdentityFocus {
    fn directive(&self) -> &'static str {
        match self {
            IdentityFocus::Front => "Use the FRONT VIEW as the primary facial reference, but map it onto the 3D structure implied by the sketch.",
            IdentityFocus::Profile => "CRITICAL: For this side view, disregard any front view. STRICTLY COPY the nose shape and jawline from the SIDE PROFILE references.",
            IdentityFocus::Expression => "CRITICAL: Use the EXPRESSION reference as the primary source for teeth, mouth shape and eye crinkles.",
            IdentityFocus::BackView => "CRITICAL: Focus on hair volume and shoulder structure. Do NOT force a face to be visible; the subject faces away from the camera.",
        }
    }
}

/// Instruction for the storyboard sketch pass.
pub fn sketch_instruction(pose_text: &str) -> String {
    format!(
        "Act as a Technical Storyboard Artist. DRAW A COMPOSITION SKETCH for: \"{pose_text}\".

[STRICT CAMERA RULES]
1. IF text contains \"Front\" -> Draw a perfectly symmetrical stick figure facing forward.
2. IF text contains \"Side\" or \"Profile\" -> Draw a figure facing 90 degrees right. NO EXCEPTIONS. The nose must be the furthest point.
3. IF text contains \"Back\" -> Draw the back of the head.
4. IF text contains \"High Angle\" -> Draw a grid on the floor to show perspective looking down.

[STYLE]
- Use thick, confident black markers.
- NO FACES. Draw an oval with a cross (+) to indicate face direction.
- NO SHADING. High contrast black & white only.
- FILL THE CANVAS. Ensure the sketch matches the requested aspect ratio fully."
    )
}

/// Instruction text that follows the sketch and reference images.
///
/// Image numbering matches the part order the transport must use: sketch
/// first (if any), then references in request order.
pub fn synthesis_instruction(request: &SynthesisRequest) -> String {
    let mut index = 1usize;
    let mut image_map = Vec::new();

    if request.sketch.is_some() {
        image_map.push(format!(
            "- Image {index} (POSE SKETCH): the ONLY authority for pose, body geometry and camera angle."
        ));
        index += 1;
    }
    for reference in &request.references {
        image_map.push(format!("- Image {index} ({})", reference.label));
        index += 1;
    }

    let geometry = if request.sketch.is_some() {
        "- The pose sketch is the sole geometry authority. Match its body position, head direction and camera angle exactly."
    } else {
        "- Take pose and camera angle from the scene description only."
    };

    let (style_block, negative) = match request.options.style {
        StyleMode::Raw => (
            "[STYLE GUIDE]
- Candid Lifestyle Photography.
- 35mm Film Look (Grain, slight imperfections).
- Natural Lighting (No studio gloss unless specified).
- Texture: Focus on fabric weaves and skin pores.",
            RAW_NEGATIVE_PROMPT,
        ),
        StyleMode::Polished => (
            "[STYLE GUIDE]
- Photorealistic lifestyle photography.",
            POLISHED_NEGATIVE_PROMPT,
        ),
    };

    format!(
        "[TASK]
Create a highly photorealistic image of a specific person based on MULTIPLE reference inputs.

[INPUT CONTEXT]
{image_map}

[GEOMETRY]
{geometry}
- The identity references are texture and feature sources ONLY. IGNORE their pose, head angle, framing and background.

[IDENTITY SYNTHESIS (CRITICAL)]
- Construct a mental 3D model of this person by combining ALL identity references.
- {focus}
- Preserve natural asymmetries, moles, skin texture, eye distance and nose geometry exactly.
- Do NOT beautify, smooth or idealize the face. Do NOT blend features with generic faces.

[BODY & OUTFIT]
- IGNORE the clothes in the reference images. Use the outfit described below.

[SCENE DESCRIPTION]
{prompt}

{style_block}

[NEGATIVE PROMPT]
{negative}, {global}",
        image_map = image_map.join("\n"),
        geometry = geometry,
        focus = request.identity_focus.directive(),
        prompt = request.prompt,
        style_block = style_block,
        negative = negative,
        global = GLOBAL_NEGATIVE_PROMPT,
    )
}

/// Instruction for the training-caption pass.
pub fn caption_instruction(trigger_label: &str) -> String {
    format!(
        "Analyze this image for AI image model training (LoRA/Flux dataset).
Start the caption with the trigger word: \"{trigger_label}\".

Format: Comma-separated tags and short phrases. Lowercase.

Structure the caption in this order:
1. Trigger word
2. Shot type (e.g., close up, full body)
3. Subject description (hair, ethnicity, gaze)
4. Action/Pose
5. Outfit (detailed)
6. Environment/Background
7. Lighting quality (e.g., hard shadow, soft window light)
8. Technical details (e.g., blurry background, film grain, flash photography)

Example output:
{trigger_label}, close up portrait of a woman, looking at camera, messy bun, wearing a grey hoodie, indoors, window light, hard shadows, film grain, high quality"
    )
}

/// Extract a judge score from free text: first integer found, clamped to 10.
///
/// Missing or non-numeric verdicts score 0.
pub fn parse_score(text: &str) -> u8 {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return 0;
    }
    // Too long for u32 is still far above the scale.
    digits.parse::<u32>().map_or(10, |n| n.min(10) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenerationOptions, IdentityReference, ImagePayload};

    fn request(sketch: bool, style: StyleMode) -> SynthesisRequest {
        SynthesisRequest {
            prompt: "Coffee Shop Candid of a woman".to_string(),
            sketch: sketch.then(|| ImagePayload::png(b"sketch".to_vec())),
            references: vec![
                IdentityReference {
                    label: "FRONT VIEW - PRIMARY LIKENESS (center crop)".to_string(),
                    payload: ImagePayload::png(b"front".to_vec()),
                },
                IdentityReference {
                    label: "3/4 ANGLE - DEPTH".to_string(),
                    payload: ImagePayload::png(b"tq".to_vec()),
                },
            ],
            identity_focus: IdentityFocus::Front,
            options: GenerationOptions {
                style,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_image_map_numbers_sketch_first() {
        let text = synthesis_instruction(&request(true, StyleMode::Raw));
        assert!(text.contains("Image 1 (POSE SKETCH)"));
        assert!(text.contains("Image 2 (FRONT VIEW - PRIMARY LIKENESS (center crop))"));
        assert!(text.contains("Image 3 (3/4 ANGLE - DEPTH)"));
        assert!(text.contains("sole geometry authority"));
    }

    #[test]
    fn test_image_map_without_sketch_starts_at_references() {
        let text = synthesis_instruction(&request(false, StyleMode::Raw));
        assert!(!text.contains("POSE SKETCH"));
        assert!(text.contains("Image 1 (FRONT VIEW"));
        assert!(text.contains("scene description only"));
    }

    #[test]
    fn test_identity_and_pose_leakage_directives_present() {
        let text = synthesis_instruction(&request(true, StyleMode::Polished));
        assert!(text.contains("IGNORE their pose"));
        assert!(text.contains("asymmetries"));
        assert!(text.contains("Do NOT beautify"));
        assert!(text.contains(GLOBAL_NEGATIVE_PROMPT));
    }

    #[test]
    fn test_style_switches_negative_list() {
        let raw = synthesis_instruction(&request(true, StyleMode::Raw));
        let polished = synthesis_instruction(&request(true, StyleMode::Polished));
        assert!(raw.contains("35mm Film Look"));
        assert!(raw.contains("airbrushed"));
        assert!(!polished.contains("airbrushed"));
    }

    #[test]
    fn test_caption_instruction_leads_with_trigger() {
        let text = caption_instruction("lola woman");
        assert!(text.contains("Start the caption with the trigger word: \"lola woman\""));
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("8"), 8);
        assert_eq!(parse_score(" 7\n"), 7);
        assert_eq!(parse_score("Score: 9/10"), 9);
        assert_eq!(parse_score("42"), 10);
        assert_eq!(parse_score("99999999999"), 10);
        assert_eq!(parse_score("rated 00000000000000000007"), 7);
        assert_eq!(parse_score("excellent"), 0);
        assert_eq!(parse_score(""), 0);
    }
}

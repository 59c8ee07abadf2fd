//! Pure mapping from an [`OperationRequest`](crate::request::OperationRequest)
//! to the directive text the transformation service receives. Same request in,
//! same text out; nothing here touches the network or the clock.

use crate::request::{
    AspectRatio, EnhanceQuality, EnhanceStyle, ExpandQuality, MergeMode, MockupTheme,
    OperationRequest, RemovalMode,
};

/// System instruction for the standalone prompt-rewrite call.
pub const POLISH_SYSTEM_INSTRUCTION: &str =
    "You are a creative assistant and an expert prompt engineer. Output MUST be the prompt text only.";

/// User-turn text for the standalone prompt-rewrite call.
pub fn polish_request(prompt: &str) -> String {
    format!("Enhance this image generation prompt: \"{prompt}\"")
}

pub fn compose(request: &OperationRequest) -> String {
    match request {
        OperationRequest::Enhance { style, quality } => enhance_directive(*style, *quality),
        OperationRequest::Expand {
            prompt,
            ratio,
            quality,
        } => expand_directive(prompt, ratio, *quality),
        OperationRequest::RemoveBackground {
            mode,
            prompt,
            enhance_subject,
        } => remove_background_directive(*mode, prompt, *enhance_subject),
        OperationRequest::Mockup { theme, prompt } => mockup_directive(*theme, prompt),
        OperationRequest::Merge { mode, prompt } => merge_directive(*mode, prompt),
    }
}

fn enhance_directive(style: EnhanceStyle, quality: EnhanceQuality) -> String {
    format!(
        "{} {} Output ONLY the enhanced image, without any additional text, captions, or explanations.",
        style_clause(style),
        quality_clause(quality)
    )
}

fn style_clause(style: EnhanceStyle) -> &'static str {
    match style {
        EnhanceStyle::Auto => {
            "As a professional photo editor, enhance this image with superior quality. Improve resolution, clarity, and color balance."
        }
        EnhanceStyle::Upscale => {
            "As a specialist in image super-resolution, your only task is to upscale the image while strictly preserving the original colors, lighting, and artistic intent. Do not shift the tone or add filters. Focus purely on increasing pixel density, sharpness, and resolving fine details to make the image look crisp at high resolutions."
        }
        EnhanceStyle::Lighting => {
            "As a professional photo editor, correct the lighting and color balance of this image. Make the colors vibrant and natural, and adjust exposure and contrast for a polished look."
        }
        EnhanceStyle::Sharpen => {
            "As a professional photo editor, sharpen the details and textures in this image. Increase clarity and definition without introducing artifacts or over-sharpening."
        }
        EnhanceStyle::Artistic => {
            "As a professional photo editor, transform this image with an artistic, dramatic touch. Enhance it with a cinematic feel, boosting colors and contrast for a high-impact look."
        }
        EnhanceStyle::Restore => {
            "As an expert in digital photo restoration, meticulously restore this old photograph. Repair any damage such as scratches, tears, and fading. Reduce noise and grain while preserving the original details and character. Improve contrast and sharpness to bring the photo back to life."
        }
        EnhanceStyle::Colorize => {
            "As a specialist in photo colorization, add realistic and vibrant colors to this black and white image. Pay close attention to historical accuracy, natural skin tones, and context-appropriate colors for the environment and clothing. The final result should be a believable and beautifully colorized photograph."
        }
    }
}

fn quality_clause(quality: EnhanceQuality) -> &'static str {
    match quality {
        EnhanceQuality::Hd => {
            "Upscale the image to high-definition (HD), ensuring clarity and sharpness."
        }
        EnhanceQuality::FourK => {
            "Upscale the image to stunning 4K resolution. Focus on creating ultra-sharp details and vibrant textures suitable for high-resolution displays."
        }
        EnhanceQuality::EightK => {
            "Upscale the image to breathtaking 8K cinematic resolution. Meticulously enhance every detail, texture, and color gradient to achieve a photorealistic and professional-grade result."
        }
    }
}

fn expand_directive(prompt: &str, ratio: &AspectRatio, quality: ExpandQuality) -> String {
    let direction = if prompt.trim().is_empty() {
        "Expand the image with a natural continuation of the existing scene.".to_string()
    } else {
        format!("Creative direction for the expanded areas: \"{prompt}\"")
    };

    let ratio_instruction = match ratio {
        AspectRatio::Original => "Keep the aspect ratio of the original image.".to_string(),
        AspectRatio::Named(name) => format!(
            "Transform the composition to fit a {name} aspect ratio. Crop or expand the canvas intelligently to fit this ratio while keeping the main subject centered and intact."
        ),
    };

    let quality_instruction = match quality {
        ExpandQuality::EightK => {
            "Upscale the final output to breathtaking 8K resolution with photorealistic details."
        }
        ExpandQuality::FourK => "Upscale the final output to 4K resolution with sharp details.",
        ExpandQuality::Hd => "Ensure the output is high-definition (HD).",
        ExpandQuality::Same => "Maintain the visual quality of the original image.",
    };

    format!(
        "Your primary task is photorealistic outpainting and zooming out.\n\
         1. **Zoom Out & Re-compose**: You must virtually \"zoom out\" of the original image. Place the original image in the center of a new, larger canvas.\n\
         2. **Aspect Ratio**: {ratio_instruction}\n\
         3. **Generate Environment**: Fill the new empty space around the original image by generating a seamless, contextually consistent environment. The new details must match the lighting, shadows, perspective, and style of the original.\n\
         4. **Quality & Resolution**: {quality_instruction}\n\
         5. **User Direction**: {direction}\n\
         6. **Output**: Your output must be ONLY the final, expanded image. Do not include any text, descriptions, or any other content."
    )
}

fn remove_background_directive(mode: RemovalMode, prompt: &str, enhance_subject: bool) -> String {
    let (subject, action) = match mode {
        RemovalMode::Strict => (
            "the SINGLE main physical product or person".to_string(),
            "REMOVE the background, AND REMOVE all text, logos, watermarks, and floating graphics. The result should be just the object.",
        ),
        RemovalMode::Standard => (
            "the main subject AND all accompanying text, logos, and graphic overlays".to_string(),
            "REMOVE ONLY the environmental background (walls, floors, scenery, solid colors). KEEP all text, logos, and branding elements intact.",
        ),
        RemovalMode::Custom if !prompt.trim().is_empty() => (
            format!("the subject described as: \"{prompt}\""),
            "Remove everything not matching the description.",
        ),
        RemovalMode::Custom => (
            "the main foreground subject".to_string(),
            "Remove the background.",
        ),
    };

    let processing = if enhance_subject {
        if mode == RemovalMode::Standard {
            // Redrawing must not mangle the text and logos standard mode keeps.
            "ENHANCE the image resolution and clarity. You may redraw the main subject to look better, but you MUST preserve the legibility and shape of any text or logos EXACTLY as they are."
        } else {
            "ENHANCE the subject details. You may redraw textures and lighting to make it look high-quality, creating a professional product shot look."
        }
    } else {
        "STRICT PIXEL FIDELITY. Do NOT redraw. Do NOT alter the look of the subject or text. Simply generate a precise transparency mask."
    };

    format!(
        "TASK: Generate a Transparent PNG Cutout.\n\
         \n\
         1. **Identify Subject**: Identify {subject}.\n\
         2. **Action**: {action}\n\
         3. **Transparency**: The background MUST be 100% transparent (Alpha Channel = 0).\n\
         4. **Processing**: {processing}\n\
         5. **Output**: Return ONLY the resulting image with a transparent background."
    )
}

fn mockup_directive(theme: MockupTheme, prompt: &str) -> String {
    let theme_clause = match theme {
        MockupTheme::ModernStudio => {
            "A clean, modern studio setting with soft, diffused lighting. Neutral background colors (soft grey, white, or pastel)."
        }
        MockupTheme::Podium => {
            "A 3D geometric podium display. Minimalist style with strong directional lighting."
        }
        MockupTheme::Luxury => {
            "A high-end luxury environment. Darker tones, perhaps marble textures, gold accents, or dramatic mood lighting."
        }
        MockupTheme::Nature => {
            "A natural outdoor setting with sunlight, greenery, or a blue sky background. Fresh and organic feel."
        }
        MockupTheme::LifestyleHome => {
            "A cozy home or office environment. Placed on a wooden table or desk with blurred lifestyle elements in the background."
        }
        MockupTheme::Cyberpunk => {
            "A futuristic, cyberpunk aesthetic with neon lights (blue/pink) and a tech-inspired background."
        }
        MockupTheme::Water => {
            "A refreshing scene involving water, splash effects, or ice. Cool tones."
        }
    };

    let overrides = if prompt.is_empty() {
        String::new()
    } else {
        format!("Additional User Details: {prompt}")
    };

    format!(
        "Act as a world-class Product Photographer and Ad Designer.\n\
         Task: Analyze the input subject and composite it into a professional advertisement background.\n\
         \n\
         1. **Analyze Subject**: First, identify the object in the input image (e.g., perfume, shoe, watch, person). Understand its material (glass, leather, skin) and how light should interact with it.\n\
         2. **Adapt Scene**: Use the theme: \"{theme_clause}\". IMPORTANT: Customize this theme to specifically fit the detected object category. (e.g., if it's a coffee cup, add steam or beans; if it's a shoe, make the surface rugged or sporty).\n\
         3. **Composite**: Place the subject seamlessly into this environment.\n\
         4. **Integration**: Generate realistic shadows, reflections, and color bleeding on the surface where the subject sits. Match the lighting of the subject to the new background.\n\
         5. **User Overrides**: {overrides}\n\
         6. **Constraints**: NO TEXT. NO LOGOS.\n\
         7. **Quality**: Output a photorealistic, high-resolution image."
    )
}

fn merge_directive(mode: MergeMode, prompt: &str) -> String {
    let instructions = match mode {
        MergeMode::Replace => {
            "MODE: PROFESSIONAL OBJECT REPLACEMENT (Seamless In-painting)\n\
             1. **Identify & Swap**: Locate the main subject in Input 2 (Reference Image). COMPLETELY REMOVE IT. Insert the subject from Input 1 (Source) in its place.\n\
             2. **Match Perspective**: Transform the Source Object's perspective to match the camera angle of the Reference Image perfectly.\n\
             3. **RE-LIGHTING (Critical)**: You MUST change the lighting of the Source Object to match the environment of Input 2.\n\
             - If Input 2 has warm sunset light from the left, the Source Object must be lit from the left with warm light.\n\
             - If Input 2 is dark and moody, the Source Object must be darkened.\n\
             - Cast realistic shadows on the floor/surface based on the scene's light sources.\n\
             4. **Reflections**: If the surface is reflective, generate a reflection of the new object.\n\
             5. **Color Grading**: Apply the color grade/filter of the Reference Image to the new object so they look like they were shot together."
        }
        MergeMode::Place => {
            "MODE: HIGH-END SCENE COMPOSITION\n\
             1. **Analyze Scene**: Look at Input 2 (Reference). Find the focal point or surface where a product/person belongs naturally.\n\
             2. **Integrate**: Place the subject from Input 1 into that space.\n\
             3. **Physical Grounding**: The object MUST NOT look floating. Generate ambient occlusion (contact shadows) where it touches the surface.\n\
             4. **Environmental Influence**:\n\
             - The object should reflect the colors of the surroundings.\n\
             - Match the blur/depth-of-field. If the background is blurry, the edges of the object should blend naturally, not be razor sharp cutouts.\n\
             5. **Lighting Match**: Re-render the object's illumination to match the scene's light direction and intensity."
        }
    };

    format!(
        "Act as a World-Class Digital Artist and Professional Retoucher.\n\
         Your goal is to create an Award-Winning Commercial Image by seamlessly merging two inputs.\n\
         \n\
         Input 1: The Hero Subject (Product/Person).\n\
         Input 2: The Background/Context Image.\n\
         \n\
         {instructions}\n\
         \n\
         User Additional Instructions: {prompt}\n\
         \n\
         CRITICAL OUTPUT RULES:\n\
         - The result must be PHOTOREALISTIC.\n\
         - NO \"sticker effect\" (where the object looks pasted on top).\n\
         - Seamless blending of edges, lighting, and colors is required.\n\
         - Output ONLY the final composited image."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enhance(style: &str, quality: &str) -> OperationRequest {
        OperationRequest::Enhance {
            style: EnhanceStyle::from_key(style),
            quality: EnhanceQuality::from_key(quality),
        }
    }

    #[test]
    fn compose_is_deterministic() {
        let request = OperationRequest::Mockup {
            theme: MockupTheme::Cyberpunk,
            prompt: "add rain".to_string(),
        };
        assert_eq!(compose(&request), compose(&request));
    }

    #[test]
    fn enhance_combines_style_quality_and_output_rule() {
        let text = compose(&enhance("restore", "4k"));
        assert!(text.starts_with("As an expert in digital photo restoration"));
        assert!(text.contains("stunning 4K resolution"));
        assert!(text.ends_with(
            "Output ONLY the enhanced image, without any additional text, captions, or explanations."
        ));
    }

    #[test]
    fn unknown_enhance_keys_compose_like_the_defaults() {
        assert_eq!(compose(&enhance("dreamy", "16k")), compose(&enhance("auto", "hd")));
    }

    #[test]
    fn expand_names_the_requested_ratio() {
        let request = OperationRequest::Expand {
            prompt: String::new(),
            ratio: AspectRatio::from_key("16:9"),
            quality: ExpandQuality::EightK,
        };
        let text = compose(&request);
        assert!(text.contains("fit a 16:9 aspect ratio"));
        assert!(text.contains("keeping the main subject centered and intact"));
        assert!(text.contains("breathtaking 8K resolution"));
        assert!(text.contains("Expand the image with a natural continuation of the existing scene."));
    }

    #[test]
    fn expand_original_ratio_keeps_the_canvas_shape() {
        let request = OperationRequest::Expand {
            prompt: "a foggy harbor".to_string(),
            ratio: AspectRatio::Original,
            quality: ExpandQuality::Same,
        };
        let text = compose(&request);
        assert!(text.contains("Keep the aspect ratio of the original image."));
        assert!(text.contains("Maintain the visual quality of the original image."));
        assert!(text.contains("Creative direction for the expanded areas: \"a foggy harbor\""));
    }

    #[test]
    fn remove_background_modes_swap_subject_and_action() {
        let strict = compose(&OperationRequest::RemoveBackground {
            mode: RemovalMode::Strict,
            prompt: String::new(),
            enhance_subject: false,
        });
        assert!(strict.contains("the SINGLE main physical product or person"));
        assert!(strict.contains("REMOVE all text, logos, watermarks"));
        assert!(strict.contains("STRICT PIXEL FIDELITY"));

        let standard = compose(&OperationRequest::RemoveBackground {
            mode: RemovalMode::Standard,
            prompt: String::new(),
            enhance_subject: true,
        });
        assert!(standard.contains("KEEP all text, logos, and branding elements intact"));
        assert!(standard.contains("preserve the legibility and shape of any text or logos EXACTLY"));

        let custom = compose(&OperationRequest::RemoveBackground {
            mode: RemovalMode::Custom,
            prompt: "the ceramic vase".to_string(),
            enhance_subject: true,
        });
        assert!(custom.contains("the subject described as: \"the ceramic vase\""));
        assert!(custom.contains("creating a professional product shot look"));
    }

    #[test]
    fn blank_custom_removal_falls_back_to_generic_subject() {
        let text = compose(&OperationRequest::RemoveBackground {
            mode: RemovalMode::Custom,
            prompt: "   ".to_string(),
            enhance_subject: false,
        });
        assert!(text.contains("the main foreground subject"));
        assert!(text.contains("2. **Action**: Remove the background."));
    }

    #[test]
    fn mockup_includes_theme_and_optional_details() {
        let bare = compose(&OperationRequest::Mockup {
            theme: MockupTheme::Water,
            prompt: String::new(),
        });
        assert!(bare.contains("splash effects, or ice"));
        assert!(bare.contains("5. **User Overrides**: \n"));
        assert!(bare.contains("NO TEXT. NO LOGOS."));

        let detailed = compose(&OperationRequest::Mockup {
            theme: MockupTheme::Podium,
            prompt: "shot from a low angle".to_string(),
        });
        assert!(detailed.contains("Additional User Details: shot from a low angle"));
    }

    #[test]
    fn merge_modes_select_distinct_blocks() {
        let replace = compose(&OperationRequest::Merge {
            mode: MergeMode::Replace,
            prompt: String::new(),
        });
        let place = compose(&OperationRequest::Merge {
            mode: MergeMode::Place,
            prompt: String::new(),
        });
        assert!(replace.contains("PROFESSIONAL OBJECT REPLACEMENT"));
        assert!(replace.contains("COMPLETELY REMOVE IT"));
        assert!(place.contains("HIGH-END SCENE COMPOSITION"));
        assert!(place.contains("ambient occlusion (contact shadows)"));
        for text in [&replace, &place] {
            assert!(text.contains("Input 1: The Hero Subject (Product/Person)."));
            assert!(text.contains("NO \"sticker effect\""));
            assert!(text.contains("User Additional Instructions: \n"));
        }
    }

    #[test]
    fn merge_appends_user_instructions() {
        let text = compose(&OperationRequest::Merge {
            mode: MergeMode::Place,
            prompt: "keep the left side empty".to_string(),
        });
        assert!(text.contains("User Additional Instructions: keep the left side empty"));
    }

    #[test]
    fn polish_request_quotes_the_prompt() {
        assert_eq!(
            polish_request("a red bicycle"),
            "Enhance this image generation prompt: \"a red bicycle\""
        );
        assert!(POLISH_SYSTEM_INSTRUCTION.contains("prompt text only"));
    }
}

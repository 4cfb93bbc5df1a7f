use crate::catalog::{Persona, Style};

/// Text part sent ahead of the user's photo.
pub const PHOTO_INTRO_TEXT: &str = "I will provide my photo:";

/// Descriptive clause for the footballer(s) in the scene.
pub fn persona_clause(persona: Persona) -> &'static str {
    match persona {
        Persona::Messi => "Lionel Messi in his Argentina national team jersey",
        Persona::Ronaldo => "Cristiano Ronaldo in his Portugal national team jersey",
        Persona::Both => {
            "Lionel Messi in his Argentina jersey and Cristiano Ronaldo in his Portugal jersey"
        }
    }
}

/// Builds the composite instruction for one generation.
///
/// The template text is fixed; only the style label (lower-cased) and the
/// persona clause vary, so the same selection always yields the same prompt.
pub fn compose_prompt(persona: Persona, style: Style) -> String {
    let style = style.label().to_lowercase();
    let persona = persona_clause(persona);
    format!(
        "Create a {style} image where the person in the provided photo is taking a selfie\n\
with {persona}. The person should be holding a pint of Guinness beer with the iconic\n\
dark stout and creamy white head. All people are looking at the camera as if taking\n\
a group selfie. The setting in the original image should be maintained.\n\
The person's face from the original image should be preserved exactly as it appears.\n\
Make it look natural and celebratory, like they just met their football heroes.\n\
The Guinness glass should be clearly visible and recognizable."
    )
}

#[cfg(test)]
mod tests {
    use super::{compose_prompt, persona_clause};
    use crate::catalog::{Persona, Style};

    #[test]
    fn every_selection_is_deterministic_and_mentions_its_parts() {
        for persona in Persona::ALL {
            for style in Style::ALL {
                let first = compose_prompt(persona, style);
                let second = compose_prompt(persona, style);
                assert_eq!(first, second);
                assert!(!first.trim().is_empty());
                assert!(first.contains(&style.label().to_lowercase()));
                assert!(first.contains(persona_clause(persona)));
            }
        }
    }

    #[test]
    fn messi_cinematic_prompt_excludes_ronaldo() {
        let prompt = compose_prompt(Persona::Messi, Style::Cinematic);
        assert!(prompt.starts_with("Create a cinematic image"));
        assert!(prompt.contains("Lionel Messi in his Argentina national team jersey"));
        assert!(!prompt.contains("Ronaldo"));
    }

    #[test]
    fn both_prompt_mentions_both_jerseys() {
        let prompt = compose_prompt(Persona::Both, Style::Casual);
        assert!(prompt.contains("Lionel Messi in his Argentina jersey"));
        assert!(prompt.contains("Cristiano Ronaldo in his Portugal jersey"));
    }

    #[test]
    fn template_keeps_composition_constraints() {
        let prompt = compose_prompt(Persona::Ronaldo, Style::Professional);
        assert_eq!(prompt.lines().count(), 7);
        assert!(prompt.contains("holding a pint of Guinness beer"));
        assert!(prompt.contains("looking at the camera"));
        assert!(prompt.contains("setting in the original image should be maintained"));
        assert!(prompt.contains("preserved exactly as it appears"));
    }
}

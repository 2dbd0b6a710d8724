use crate::models::{ViewingAngle, VIEWING_ANGLES};

const SEPARATOR: &str = "\n\n";
const REALISM_DIRECTIVE: &str =
    "Ensure the 3D representation looks realistic and scientifically accurate.";

pub fn build_angle_prompt(system_prompt: &str, user_prompt: &str, angle: &ViewingAngle) -> String {
    format!(
        "{system_prompt}{SEPARATOR}User Request: {user_prompt}{SEPARATOR}Specific View: Generate this from a {}. {REALISM_DIRECTIVE}",
        angle.prompt_fragment
    )
}

pub fn select_angles(all_angles: bool) -> Vec<ViewingAngle> {
    if all_angles {
        VIEWING_ANGLES.to_vec()
    } else {
        vec![ViewingAngle::front()]
    }
}

pub fn progress_message(angle: &ViewingAngle, index: usize, total: usize) -> String {
    format!("Generating {}... ({}/{total})", angle.name, index + 1)
}

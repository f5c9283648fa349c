//! Prompt text sent to remote agents.
//!
//! Every template is plain interpolation over a fixed roster, so identical
//! inputs always produce byte-identical prompts.

/// OCR instruction for the agent runtime.
pub const AGENT_OCR_PROMPT: &str = "Perform OCR on the attached image. Return only the result text in markdown format without any comments. Preserve tabular formats if any.";

/// OCR instruction for the vision tool method.
pub const TOOL_OCR_PROMPT: &str =
    "Analyze the image and transcribe the text if any. Do not add any conversational commentary.";

/// A doctor a patient can be referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Specialist {
    /// Label matched in agent replies, e.g. `Dr. Philip`.
    pub name: &'static str,
    pub role: &'static str,
}

impl Specialist {
    /// `Dr. Philip (Endocrinologist)`.
    pub fn listing(&self) -> String {
        format!("{} ({})", self.name, self.role)
    }
}

/// Consultants a general physician refers to, in priority order.
pub const CONSULTANTS: &[Specialist] = &[
    Specialist { name: "Dr. Philip", role: "Endocrinologist" },
    Specialist { name: "Dr. Eleena", role: "Dermatologist" },
    Specialist { name: "Dr. Hima", role: "Eye Specialist" },
    Specialist { name: "Dr. Eliyaz", role: "ENT Specialist" },
];

/// Triage roster: the general physician first, then the consultants.
pub const TRIAGE_ROSTER: &[Specialist] = &[
    Specialist { name: "Dr. Priya", role: "General Physician" },
    Specialist { name: "Dr. Philip", role: "Endocrinologist" },
    Specialist { name: "Dr. Eleena", role: "Dermatologist" },
    Specialist { name: "Dr. Hima", role: "Eye Specialist" },
    Specialist { name: "Dr. Eliyaz", role: "ENT Specialist" },
];

/// Who the analysis agent is asked to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persona {
    /// Picks a consultant from [`CONSULTANTS`].
    GeneralPhysician,
    /// Picks a specialist from [`TRIAGE_ROSTER`].
    TriageAssistant,
}

impl Persona {
    pub fn roster(&self) -> &'static [Specialist] {
        match self {
            Persona::GeneralPhysician => CONSULTANTS,
            Persona::TriageAssistant => TRIAGE_ROSTER,
        }
    }

    fn opening(&self) -> &'static str {
        match self {
            Persona::GeneralPhysician => "You are a General Physician.",
            Persona::TriageAssistant => "You are a hospital triage assistant.",
        }
    }

    fn referral(&self) -> &'static str {
        match self {
            Persona::GeneralPhysician => "consultant",
            Persona::TriageAssistant => "specialist",
        }
    }
}

fn roster_listing(roster: &[Specialist]) -> String {
    roster
        .iter()
        .map(Specialist::listing)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Ask the agent which specialist a patient should see.
pub fn analysis_prompt(persona: Persona, transcription: &str) -> String {
    format!(
        "\n{} Analyze the following patient transcription and suggest the most relevant {} from this list: {}.\n\n\
         If more than one could be relevant, pick the most appropriate.\n\n\
         Patient transcription:\n{}\n\n\
         Reply with the specialist's name only (e.g., Dr. Priya), and a brief reason for your choice.\n",
        persona.opening(),
        persona.referral(),
        roster_listing(persona.roster()),
        transcription
    )
}

/// Ask the agent what a caller wants from a transcribed message.
pub fn intent_prompt(mobile_number: &str, transcription: &str) -> String {
    format!(
        "Analyze the following transcribed video message and determine the speaker's intent.\n\
         \n\
         Mobile Number: {mobile_number}\n\
         Transcribed Message: {transcription}\n\
         \n\
         Please identify:\n\
         1. The main intent or purpose of the message\n\
         2. Any specific requests or actions mentioned\n\
         3. The sentiment and tone of the speaker\n\
         4. Key information or details provided\n\
         \n\
         Provide a structured analysis of the speaker's intent."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physician_prompt_lists_consultants() {
        let p = analysis_prompt(Persona::GeneralPhysician, "itchy rash on arm");
        assert!(p.starts_with("\nYou are a General Physician. Analyze"));
        assert!(p.contains(
            "consultant from this list: Dr. Philip (Endocrinologist), Dr. Eleena (Dermatologist), \
             Dr. Hima (Eye Specialist), Dr. Eliyaz (ENT Specialist).\n\n"
        ));
        assert!(p.contains("Patient transcription:\nitchy rash on arm\n\n"));
        assert!(p.ends_with("a brief reason for your choice.\n"));
        assert!(!p.contains("Dr. Priya (General Physician)"));
    }

    #[test]
    fn triage_prompt_puts_priya_first() {
        let p = analysis_prompt(Persona::TriageAssistant, "ear pain");
        assert!(p.starts_with("\nYou are a hospital triage assistant."));
        assert!(p.contains("specialist from this list: Dr. Priya (General Physician), Dr. Philip"));
    }

    #[test]
    fn prompts_are_deterministic() {
        let t = "blurred vision for two days";
        assert_eq!(
            analysis_prompt(Persona::TriageAssistant, t),
            analysis_prompt(Persona::TriageAssistant, t)
        );
        assert_eq!(intent_prompt("+91 98765", t), intent_prompt("+91 98765", t));
    }

    #[test]
    fn intent_prompt_layout() {
        let p = intent_prompt("5550100", "please call me back");
        let lines: Vec<&str> = p.lines().collect();
        assert_eq!(
            lines[0],
            "Analyze the following transcribed video message and determine the speaker's intent."
        );
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Mobile Number: 5550100");
        assert_eq!(lines[3], "Transcribed Message: please call me back");
        assert_eq!(lines[5], "Please identify:");
        assert_eq!(lines.last(), Some(&"Provide a structured analysis of the speaker's intent."));
    }

    #[test]
    fn ocr_prompts_differ_per_backend() {
        assert!(AGENT_OCR_PROMPT.contains("markdown"));
        assert!(TOOL_OCR_PROMPT.starts_with("Analyze the image"));
    }
}

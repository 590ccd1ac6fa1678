//! Persona registry
//!
//! Maps each intent to the system prompt that sets the assistant's tone and to
//! the TTS voice the voice backend should switch to.

use crate::error::{AgentError, AgentResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// TTS voice type for XiaoMei
pub const VOICE_TYPE_XIAO_MEI: u32 = 601005;
/// TTS voice type for XiaoShuai
pub const VOICE_TYPE_XIAO_SHUAI: u32 = 601008;

/// The assistant persona a request is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    XiaoMei,
    XiaoShuai,
}

impl Intent {
    /// Every representable intent, in declaration order
    pub const ALL: [Intent; 2] = [Intent::XiaoMei, Intent::XiaoShuai];

    /// Label the classifier is asked to answer with
    pub fn label(&self) -> &'static str {
        match self {
            Intent::XiaoMei => "XiaoMei",
            Intent::XiaoShuai => "XiaoShuai",
        }
    }

    /// Exact-match label lookup; no trimming or case folding
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|intent| intent.label() == label)
    }
}

impl Default for Intent {
    fn default() -> Self {
        Intent::XiaoMei
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Intent {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| {
            AgentError::internal_error(format!("Unknown persona label: {s}"))
        })
    }
}

/// Tone instructions and voice for one persona
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub system_prompt: String,
    pub voice_type: u32,
}

/// Lookup table from intent to persona
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: HashMap<Intent, Persona>,
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        let mut personas = HashMap::new();
        personas.insert(
            Intent::XiaoMei,
            Persona {
                system_prompt: "You are an AI assistant named XiaoMei(小美). Keep the conversation casual, lively, and concise".to_string(),
                voice_type: VOICE_TYPE_XIAO_MEI,
            },
        );
        personas.insert(
            Intent::XiaoShuai,
            Persona {
                system_prompt: "You are an AI assistant named XiaoShuai(小帅). Keep the conversation casual, humorous, and concise".to_string(),
                voice_type: VOICE_TYPE_XIAO_SHUAI,
            },
        );
        Self { personas }
    }
}

impl PersonaRegistry {
    /// Registry holding exactly the given personas
    pub fn from_personas(personas: HashMap<Intent, Persona>) -> Self {
        Self { personas }
    }

    /// Replace the system prompt of one persona, keeping its voice
    pub fn with_prompt(mut self, intent: Intent, system_prompt: impl Into<String>) -> Self {
        let voice_type = match intent {
            Intent::XiaoMei => VOICE_TYPE_XIAO_MEI,
            Intent::XiaoShuai => VOICE_TYPE_XIAO_SHUAI,
        };
        self.personas
            .entry(intent)
            .or_insert(Persona {
                system_prompt: String::new(),
                voice_type,
            })
            .system_prompt = system_prompt.into();
        self
    }

    pub fn get(&self, intent: Intent) -> AgentResult<&Persona> {
        self.personas.get(&intent).ok_or_else(|| {
            AgentError::internal_error(format!("No persona registered for intent {intent}"))
        })
    }

    /// System prompt for the intent; errors if the registry has drifted from the enum
    pub fn system_prompt(&self, intent: Intent) -> AgentResult<&str> {
        self.get(intent).map(|p| p.system_prompt.as_str())
    }

    pub fn voice_type(&self, intent: Intent) -> AgentResult<u32> {
        self.get(intent).map(|p| p.voice_type)
    }
}

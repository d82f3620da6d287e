//! 后端层：能力抽象与实现（OpenAI Assistants / 函数调用抽取 / TTS / Mock）

pub mod assistants;
pub mod mock;
pub mod openai;
pub mod traits;

pub use assistants::OpenAiAssistants;
pub use mock::{CallCounts, ScriptedBackend};
pub use openai::{OpenAiEndpoint, OpenAiSpeech, OpenAiStructured, SpeechVoice, DEFAULT_BASE_URL};
pub use traits::{
    AssistantBackend, JobHandle, JobResult, JobStatus, SpeechRequest, SpeechSynthesizer,
    StructuredGenerator, StructuredSchema,
};

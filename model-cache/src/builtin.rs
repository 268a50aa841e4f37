//! Catalog entries shipped with the application.
//!
//! Local entries live in `<models_dir>/<directory>` as laid out by the model
//! downloader; remote entries are fetched by the inference engine.

use common::{ModelDescriptor, PackagingKind};

pub const MISTRAL_GGUF_REPO: &str = "TheBloke/Mistral-7B-Instruct-v0.1-GGUF";
pub const MISTRAL_GGUF_FILE: &str = "mistral-7b-instruct-v0.1.Q4_K_M.gguf";
pub const MISTRAL_TOKENIZER_REPO: &str = "mistralai/Mistral-7B-Instruct-v0.1";
pub const MISTRAL_CHAT_TEMPLATE: &str = "mistral.json";

pub fn builtin_descriptors() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("local-mistral-gguf", PackagingKind::LocalSelfContainedQuantized)
            .with_name("Mistral 7B Instruct (Local GGUF)")
            .with_description("Fast, efficient Mistral model in GGUF format")
            .with_size_estimate("~4.4GB")
            .with_repo(MISTRAL_GGUF_REPO)
            .with_directory("mistral-gguf")
            .with_files([MISTRAL_GGUF_FILE])
            .with_chat_template(MISTRAL_CHAT_TEMPLATE),
        ModelDescriptor::new("local-llama-vision", PackagingKind::LocalMultiFileQuantizedVision)
            .with_name("Llama 3.2 11B Vision (Local UQFF)")
            .with_description("Multimodal Llama with pre-quantized UQFF shards")
            .with_size_estimate("12-17GB")
            .with_repo("EricB/Llama-3.2-11B-Vision-Instruct-UQFF")
            .with_directory("llama-vision")
            .with_files([
                "config.json",
                "tokenizer.json",
                "tokenizer_config.json",
                "preprocessor_config.json",
                "generation_config.json",
                "residual.safetensors",
                "llama3.2-vision-instruct-q4k.uqff",
                "llama3.2-vision-instruct-q5k.uqff",
                "llama3.2-vision-instruct-q8_0.uqff",
            ])
            .with_vision(true),
        ModelDescriptor::new("local-gemma-3n-e2b", PackagingKind::LocalAdaptiveVision)
            .with_name("Gemma 3n E2B (Local, MatFormer)")
            .with_description("Compact multimodal Gemma quantized in place on load")
            .with_size_estimate("~8GB")
            .with_repo("EricB/gemma-3n-E2B-it-UQFF")
            .with_directory("gemma-3n-e2b")
            .with_files([
                "config.json",
                "tokenizer.json",
                "tokenizer_config.json",
                "preprocessor_config.json",
                "processor_config.json",
                "residual.safetensors",
            ])
            .with_vision(true),
        ModelDescriptor::new("local-smollm3-3b", PackagingKind::LocalMultiFileQuantizedText)
            .with_name("SmolLM3 3B (Local UQFF)")
            .with_description("Small text model with several pre-quantized variants")
            .with_size_estimate("~1-3GB")
            .with_repo("EricB/SmolLM3-3B-UQFF")
            .with_directory("smollm3-3b")
            .with_files([
                "config.json",
                "tokenizer.json",
                "tokenizer_config.json",
                "smollm33b-q4k-0.uqff",
                "smollm33b-q8_0-0.uqff",
                "smollm33b-afq4-0.uqff",
                "smollm33b-f8e4m3-0.uqff",
            ]),
        ModelDescriptor::new("mistral-7b-remote", PackagingKind::RemoteHosted)
            .with_name("Mistral 7B Instruct (Remote GGUF)")
            .with_description("Mistral GGUF fetched from Hugging Face on first load")
            .with_size_estimate("~4.4GB")
            .with_repo(MISTRAL_GGUF_REPO)
            .with_files([MISTRAL_GGUF_FILE])
            .with_chat_template(MISTRAL_CHAT_TEMPLATE)
            .with_tokenizer_repo(MISTRAL_TOKENIZER_REPO),
        ModelDescriptor::new("smollm3-remote", PackagingKind::RemoteHosted)
            .with_name("SmolLM3 3B (Remote)")
            .with_description("Full-precision SmolLM3 quantized in place after download")
            .with_size_estimate("~6GB")
            .with_repo("HuggingFaceTB/SmolLM3-3B"),
    ]
}

mod common;

use std::sync::Arc;

use common::{tiny_rank_file, Fixture, GPT35_URL};
use fluent_ai_tokenizers::fetch::sha256_hex;
use fluent_ai_tokenizers::{
    RegistryState, StaticSource, TokenizerConfig, TokenizerError, TokenizerRegistry, VocabularyDescriptor,
    VocabularyFormat,
};

#[tokio::test]
async fn test_get_same_type_reuses_instance() {
    let fixture = Fixture::new();

    let first = fixture.registry.get("gpt-3.5").await.unwrap();
    let second = fixture.registry.get("gpt-3.5").await.unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(fixture.source.requests(), 1);
    assert_eq!(fixture.registry.fetcher().stats().cache_hits, 0, "second get must not re-materialize");
    assert_eq!(fixture.registry.state().await, RegistryState::Loaded("gpt-3.5".into()));
}

#[tokio::test]
async fn test_get_different_type_replaces_slot() {
    let fixture = Fixture::new();

    let cl100k = fixture.registry.get("gpt-3.5").await.unwrap();
    let o200k = fixture.registry.get("gpt-4o").await.unwrap();

    assert!(!cl100k.ptr_eq(&o200k));
    assert_eq!(o200k.type_id(), "gpt-4o");
    assert_eq!(fixture.registry.state().await, RegistryState::Loaded("gpt-4o".into()));

    // The replaced handle stays usable for whoever still holds it
    assert_eq!(cl100k.encode("<|endoftext|>").unwrap(), vec![100257]);
    assert_eq!(o200k.encode("<|endoftext|>").unwrap(), vec![199999]);

    // Switching back rebuilds from the verified cache without downloading
    let again = fixture.registry.get("gpt-3.5").await.unwrap();
    assert!(!again.ptr_eq(&cl100k));
    assert_eq!(fixture.source.requests(), 2);
    assert_eq!(fixture.registry.fetcher().stats().cache_hits, 1);
}

#[tokio::test]
async fn test_setup_never_overrides_loaded_state() {
    let fixture = Fixture::new();

    let configured = fixture.registry.setup("gpt-3.5").await.unwrap();
    assert_eq!(configured.type_id(), "gpt-3.5");

    fixture.registry.get("gpt-4o").await.unwrap();

    let after = fixture.registry.setup("gpt-3.5").await.unwrap();
    assert_eq!(after.type_id(), "gpt-4o");
    assert_eq!(fixture.registry.state().await, RegistryState::Loaded("gpt-4o".into()));
}

#[tokio::test]
async fn test_setup_from_config_loads_default() {
    let fixture = Fixture::new();
    assert_eq!(fixture.registry.state().await, RegistryState::Empty);

    let handle = fixture.registry.setup_from_config().await.unwrap();
    assert_eq!(handle.type_id(), "gpt-4o");

    let again = fixture.registry.setup_from_config().await.unwrap();
    assert!(handle.ptr_eq(&again));
}

#[tokio::test]
async fn test_endoftext_encodes_to_reserved_id() {
    let fixture = Fixture::new();

    let tokenizer = fixture.registry.get("gpt-3.5").await.unwrap();
    assert_eq!(tokenizer.encode("<|endoftext|>").unwrap(), vec![100257]);
    assert_eq!(tokenizer.encode("<|fim_prefix|>").unwrap(), vec![100258]);
    assert_eq!(tokenizer.encode("<|endofprompt|>").unwrap(), vec![100276]);
    assert_eq!(tokenizer.encode("hello world").unwrap(), vec![259, 32, 119, 111, 114, 108, 100]);
    assert_eq!(tokenizer.count("hello world").unwrap(), 7);

    let stats = tokenizer.encode_with_stats("hello").unwrap();
    assert_eq!(stats.tokens, vec![259]);
    assert_eq!(stats.num_tokens, 1);
    assert_eq!(stats.num_chars, 5);
}

#[tokio::test]
async fn test_unknown_model_fails_before_network() {
    let fixture = Fixture::new();

    let err = fixture.registry.get("gpt-5-unreleased").await.unwrap_err();
    assert!(matches!(err, TokenizerError::UnknownModel { ref model_id } if model_id == "gpt-5-unreleased"));
    assert!(!err.is_retryable());
    assert_eq!(fixture.source.requests(), 0);
    assert!(fixture.cache_entries().is_empty());
    assert_eq!(fixture.registry.state().await, RegistryState::Empty);
}

#[tokio::test]
async fn test_failed_switch_keeps_previous_tokenizer() {
    let fixture = Fixture::new();
    let loaded = fixture.registry.get("gpt-3.5").await.unwrap();

    // gpt-4 points at a URL the source cannot serve
    let err = fixture.registry.get("gpt-4").await.unwrap_err();
    assert!(matches!(err, TokenizerError::Network { .. }));

    let current = fixture.registry.current().await.unwrap();
    assert!(current.ptr_eq(&loaded));
}

#[tokio::test]
async fn test_encode_requires_initialization() {
    let fixture = Fixture::new();

    assert!(matches!(
        fixture.registry.encode("hello").await,
        Err(TokenizerError::NotInitialized)
    ));
    assert!(matches!(
        fixture.registry.count("hello").await,
        Err(TokenizerError::NotInitialized)
    ));

    fixture.registry.setup("gpt-3.5").await.unwrap();
    assert_eq!(fixture.registry.encode("hello").await.unwrap(), vec![259]);
    assert_eq!(fixture.registry.count("hello world").await.unwrap(), 7);
}

#[tokio::test]
async fn test_teardown_returns_to_empty() {
    let fixture = Fixture::new();
    assert!(fixture.registry.teardown().await.is_none());

    let handle = fixture.registry.get("gpt-4o").await.unwrap();
    let released = fixture.registry.teardown().await.unwrap();
    assert!(released.ptr_eq(&handle));
    assert_eq!(fixture.registry.state().await, RegistryState::Empty);

    // setup may load again once the slot is empty
    let reloaded = fixture.registry.setup("gpt-3.5").await.unwrap();
    assert_eq!(reloaded.type_id(), "gpt-3.5");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_construct_once() {
    let fixture = Arc::new(Fixture::new());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let fixture = fixture.clone();
            tokio::spawn(async move { fixture.registry.get("gpt-3.5").await.unwrap() })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert!(handles.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
    assert_eq!(fixture.source.requests(), 1);
}

#[tokio::test]
async fn test_registry_from_config_registers_extra_vocabularies() {
    let cache = tempfile::tempdir().unwrap();
    let extra = VocabularyDescriptor::new(
        "command-r",
        VocabularyFormat::HuggingFace,
        "https://storage.example.com/tokenizers/command-r.json",
        sha256_hex(b"placeholder"),
    );
    let config = TokenizerConfig::new("gpt-3.5")
        .with_cache_dir(cache.path())
        .with_vocabulary(extra);

    let registry = TokenizerRegistry::new(&config).unwrap();
    assert!(registry.descriptors().contains("command-r"));
    assert!(registry.descriptors().contains("gpt-4o"));
    assert_eq!(registry.default_model(), "gpt-3.5");
    assert_eq!(registry.state().await, RegistryState::Empty);

    // Registering a built-in id twice is a configuration error
    let duplicate = TokenizerConfig::default().with_vocabulary(
        VocabularyDescriptor::new(
            "gpt-4o",
            VocabularyFormat::HuggingFace,
            "https://storage.example.com/tokenizers/gpt-4o.json",
            sha256_hex(b"placeholder"),
        ),
    );
    assert!(matches!(
        TokenizerRegistry::new(&duplicate),
        Err(TokenizerError::Configuration { .. })
    ));
}

#[tokio::test]
async fn test_hugging_face_vocabulary_through_registry() {
    let json = br#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": { "hello": 0, "world": 1, "[UNK]": 2 },
            "unk_token": "[UNK]"
        }
    }"#;
    let url = "https://vocab.test/word-level/tokenizer.json";
    let source = Arc::new(
        StaticSource::new()
            .with_body(url, &json[..])
            .with_body(GPT35_URL, tiny_rank_file()),
    );
    let fixture = Fixture::with_source(source);

    let mut descriptors = fixture.registry.descriptors().clone();
    descriptors
        .register(VocabularyDescriptor::new(
            "org/word-level",
            VocabularyFormat::HuggingFace,
            url,
            sha256_hex(json),
        ))
        .unwrap();
    let registry = TokenizerRegistry::with_parts(descriptors, fixture.registry.fetcher().clone(), "gpt-3.5");

    let tokenizer = registry.get("org/word-level").await.unwrap();
    assert_eq!(tokenizer.encode("hello world hello").unwrap(), vec![0, 1, 0]);
    assert!(registry
        .fetcher()
        .cache_dir()
        .join("org_2fword-level.json")
        .exists());
}

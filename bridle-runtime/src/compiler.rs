//! Grammar specification -> compiled automaton, memoized.

use std::sync::Arc;
use std::time::Instant;

use bridle_core::{
    AutomatonEngine, BridleError, GrammarSpec, Result, SchemaTranslator, TokenAutomaton,
    TokenizerSource, Vocabulary,
};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::automaton::RegexEngine;
use crate::cache::{AutomatonCache, CacheKey, CacheStats};
use crate::canonical::build_vocabulary;
use crate::certify::certify;
use crate::config::CacheConfig;
use crate::disk::DiskStore;
use crate::json_schema::JsonSchemaTranslator;

/// Resolves grammar specifications to regexes, certifies them and compiles
/// them against a vocabulary. Safe to share between request threads.
pub struct GrammarCompiler<E: AutomatonEngine = RegexEngine> {
    engine: E,
    translator: Box<dyn SchemaTranslator>,
    cache: AutomatonCache<E::Automaton>,
    disk: Option<DiskStore>,
    /// Tokenizer identity -> canonical vocabulary.
    vocabularies: DashMap<String, Arc<Vocabulary>>,
}

impl GrammarCompiler<RegexEngine> {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_engine(RegexEngine, config)
    }
}

impl<E: AutomatonEngine> GrammarCompiler<E> {
    /// Build a compiler around `engine`. Opens the disk store when one is
    /// configured, wiping it if it was written by another engine version.
    pub fn with_engine(engine: E, config: &CacheConfig) -> Result<Self> {
        let disk = config
            .disk
            .as_ref()
            .map(|disk| DiskStore::open(&disk.dir, engine.version()))
            .transpose()?;
        Ok(Self {
            engine,
            translator: Box::new(JsonSchemaTranslator),
            cache: AutomatonCache::new(config.max_entries),
            disk,
            vocabularies: DashMap::new(),
        })
    }

    pub fn with_translator(mut self, translator: impl SchemaTranslator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn disk(&self) -> Option<&DiskStore> {
        self.disk.as_ref()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Canonical vocabulary for `tokenizer`, built on first use and reused
    /// for every later call with the same tokenizer identity.
    pub fn vocabulary_for(&self, tokenizer: &dyn TokenizerSource) -> Result<Arc<Vocabulary>> {
        let identity = tokenizer.identity();
        if let Some(vocabulary) = self.vocabularies.get(&identity) {
            return Ok(Arc::clone(&vocabulary));
        }
        let vocabulary = Arc::new(build_vocabulary(tokenizer)?);
        Ok(Arc::clone(
            &self.vocabularies.entry(identity).or_insert(vocabulary),
        ))
    }

    /// The regex a grammar specification compiles to.
    pub fn resolve_pattern(&self, spec: &GrammarSpec) -> Result<String> {
        match spec {
            GrammarSpec::Regex(pattern) => Ok(pattern.clone()),
            GrammarSpec::JsonSchema { schema, whitespace } => self
                .translator
                .schema_to_regex(schema, whitespace.as_deref()),
            GrammarSpec::Choice(choices) => choice_pattern(choices),
            GrammarSpec::Grammar(_) => Err(BridleError::GrammarSpecification(
                "context-free grammars are not supported by the regex backend; \
                 use a regex, JSON schema or choice list"
                    .into(),
            )),
        }
    }

    /// Request-time check: resolve and certify without compiling.
    /// Returns the resolved pattern.
    pub fn validate(&self, spec: &GrammarSpec) -> Result<String> {
        let pattern = self.resolve_pattern(spec)?;
        certify(&pattern)?;
        Ok(pattern)
    }

    pub fn compile(
        &self,
        spec: &GrammarSpec,
        vocabulary: &Vocabulary,
    ) -> Result<Arc<E::Automaton>> {
        let pattern = self.validate(spec)?;
        self.compile_certified(pattern, vocabulary)
    }

    pub fn compile_regex(
        &self,
        pattern: &str,
        vocabulary: &Vocabulary,
    ) -> Result<Arc<E::Automaton>> {
        certify(pattern)?;
        self.compile_certified(pattern.to_string(), vocabulary)
    }

    fn compile_certified(
        &self,
        pattern: String,
        vocabulary: &Vocabulary,
    ) -> Result<Arc<E::Automaton>> {
        let key = CacheKey::new(vocabulary.hash(), pattern);
        self.cache
            .get_or_try_insert_with(&key, || self.load_or_build(&key, vocabulary))
    }

    fn load_or_build(&self, key: &CacheKey, vocabulary: &Vocabulary) -> Result<E::Automaton> {
        if let Some(disk) = &self.disk {
            if let Some(bytes) = disk.get(key) {
                match self.engine.decode(&bytes) {
                    Ok(automaton) => {
                        debug!(states = automaton.num_states(), "Loaded automaton from disk cache");
                        return Ok(automaton);
                    }
                    Err(e) => {
                        warn!(error = %e, "Discarding corrupt disk cache entry");
                        disk.remove(key);
                    }
                }
            }
        }

        let start = Instant::now();
        let automaton = self.engine.compile(&key.pattern, vocabulary)?;
        info!(
            states = automaton.num_states(),
            pattern_len = key.pattern.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Compiled grammar automaton"
        );

        if let Some(disk) = &self.disk {
            if let Err(e) = self
                .engine
                .encode(&automaton)
                .and_then(|bytes| disk.put(key, &bytes))
            {
                warn!(error = %e, "Failed to persist automaton to disk cache");
            }
        }
        Ok(automaton)
    }
}

/// Alternation of escaped literals in one capturing group.
pub fn choice_pattern(choices: &[String]) -> Result<String> {
    if choices.is_empty() {
        return Err(BridleError::GrammarSpecification(
            "choice list must not be empty".into(),
        ));
    }
    let escaped: Vec<String> = choices.iter().map(|c| regex_syntax::escape(c)).collect();
    Ok(format!("({})", escaped.join("|")))
}

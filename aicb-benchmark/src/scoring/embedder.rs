//! Token embedders used by the similarity scorer

/// Maps a token sequence to one vector per token.
///
/// Implementations receive the whole sequence so contextual models can use
/// neighbouring tokens. Vectors need not be normalized; the scorer uses
/// cosine similarity.
pub trait TokenEmbedder: Send + Sync {
    /// Short identifier recorded in run summaries
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed `tokens`, returning vectors in the same order
    fn embed(&self, tokens: &[String]) -> Vec<Vec<f32>>;
}

/// Feature-hashing embedder over character n-grams.
///
/// Each token is wrapped as `<token>`; every n-gram for n in
/// `min_n..=max_n` plus the whole token is hashed (FNV-1a) into one of
/// `dim` buckets with a hash-derived sign, and the result is L2-normalized.
/// Tokens sharing stems or spelling land close together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedNgramEmbedder {
    dim: usize,
    min_n: usize,
    max_n: usize,
    name: String,
}

impl HashedNgramEmbedder {
    pub fn new(dim: usize, min_n: usize, max_n: usize) -> Self {
        let dim = dim.max(1);
        let min_n = min_n.max(1);
        let max_n = max_n.max(min_n);
        Self {
            dim,
            min_n,
            max_n,
            name: format!("hashed-ngram-{}d-{}..{}", dim, min_n, max_n),
        }
    }

    fn embed_token(&self, token: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];

        let mut whole = Vec::with_capacity(token.len() + 1);
        whole.push(0x01);
        whole.extend_from_slice(token.as_bytes());
        self.add_feature(&mut vector, &whole);

        let chars: Vec<char> = format!("<{}>", token).chars().collect();
        let mut gram = String::new();
        for n in self.min_n..=self.max_n {
            if chars.len() < n {
                break;
            }
            for window in chars.windows(n) {
                gram.clear();
                gram.extend(window);
                self.add_feature(&mut vector, gram.as_bytes());
            }
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], bytes: &[u8]) {
        let hash = fnv1a(bytes);
        let bucket = (hash % self.dim as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign;
    }
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self::new(256, 3, 5)
    }
}

impl TokenEmbedder for HashedNgramEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, tokens: &[String]) -> Vec<Vec<f32>> {
        tokens.iter().map(|t| self.embed_token(t)).collect()
    }
}

/// Sentence-embedding model run locally through `fastembed` (ONNX).
///
/// Each token is embedded on its own, so synonyms land close together even
/// when their spelling differs. Model files are downloaded on first use.
#[cfg(feature = "fastembed")]
pub struct FastEmbedder {
    model: fastembed::TextEmbedding,
    dims: usize,
    name: String,
}

#[cfg(feature = "fastembed")]
impl FastEmbedder {
    pub fn new(model_name: Option<&str>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let (model_enum, label) = match model_name {
            Some("all-MiniLM-L6-v2") | None => (EmbeddingModel::AllMiniLML6V2, "all-MiniLM-L6-v2"),
            Some("bge-small-en-v1.5") => (EmbeddingModel::BGESmallENV15, "bge-small-en-v1.5"),
            Some("bge-base-en-v1.5") => (EmbeddingModel::BGEBaseENV15, "bge-base-en-v1.5"),
            Some(other) => return Err(format!("unknown fastembed model `{}`", other).into()),
        };

        let model = TextEmbedding::try_new(
            InitOptions::new(model_enum).with_show_download_progress(false),
        )?;

        let sample = model.embed(vec!["test"], None)?;
        let dims = sample.first().map(|v| v.len()).unwrap_or(384);
        tracing::info!("Loaded fastembed model {} ({} dimensions)", label, dims);

        Ok(Self {
            model,
            dims,
            name: format!("fastembed-{}", label),
        })
    }
}

#[cfg(feature = "fastembed")]
impl std::fmt::Debug for FastEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedder")
            .field("name", &self.name)
            .field("dims", &self.dims)
            .finish()
    }
}

#[cfg(feature = "fastembed")]
impl TokenEmbedder for FastEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dims
    }

    fn embed(&self, tokens: &[String]) -> Vec<Vec<f32>> {
        if tokens.is_empty() {
            return Vec::new();
        }
        let texts: Vec<&str> = tokens.iter().map(String::as_str).collect();
        match self.model.embed(texts, None) {
            Ok(vectors) if vectors.len() == tokens.len() => vectors,
            Ok(vectors) => {
                tracing::warn!(
                    "fastembed returned {} vectors for {} tokens",
                    vectors.len(),
                    tokens.len()
                );
                vec![vec![0.0; self.dims]; tokens.len()]
            }
            Err(e) => {
                tracing::warn!("fastembed error: {}, using zero vectors", e);
                vec![vec![0.0; self.dims]; tokens.len()]
            }
        }
    }
}

/// 64-bit FNV-1a; stable across platforms and releases
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity between two vectors; 0 when either has no magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a < 1e-12 || norm_b < 1e-12 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

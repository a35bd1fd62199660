//! Online query resolution: route the query to the enabled signal adapters,
//! fuse their rankings, enforce hard constraints, and diversify the final
//! selection.
//!
//! The two adapters run as joined concurrent futures; all later stages are
//! sequential per request. The query embedding is computed once and reused by
//! the dense adapter, the blended score, and MMR.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::timeout;

use crate::context::RetrievalContext;
use crate::search::filter::{coverage_report, passes_filter, CoverageReport};
use crate::search::fusion::{rank_map, reciprocal_rank_fusion};
use crate::search::mmr::{cosine, mmr_select, MMR_LAMBDA};
use crate::search::text_search::LexicalQueryPlan;
use crate::storage::VectorHit;
use crate::text;
use crate::types::{
    ChunkDoc, PoolSizes, ResultDebug, RetrieveDebug, RetrieveError, RetrieveParams,
    RetrieveResponse, RetrievedDoc,
};

/// At most this many soft query tokens feed the sparse boolean query.
const BASE_QUERY_TOKEN_LIMIT: usize = 8;
/// Blend weights for query similarity vs constraint coverage.
const RELEVANCE_WEIGHT: f32 = 0.8;
const COVERAGE_WEIGHT: f32 = 0.2;
/// The MMR shortlist never shrinks below this many candidates.
const SHORTLIST_FLOOR: usize = 16;

/// What one signal adapter produced for this request.
enum AdapterOutcome {
    /// Signal not requested, or its index does not exist.
    Unavailable,
    /// Ranked ids, best first (possibly empty).
    Ranked(Vec<String>),
    /// Backend error or timeout.
    Failed,
}

struct Candidate {
    cid: String,
    document: String,
    metadata: crate::types::ChunkMetadata,
    report: CoverageReport,
}

/// Resolve one retrieve call end to end.
pub async fn retrieve(
    ctx: &RetrievalContext,
    params: RetrieveParams,
) -> Result<RetrieveResponse, RetrieveError> {
    let collection = resolve_collection(ctx, &params.app)?;
    let adapter_timeout = Duration::from_millis(ctx.config.search.adapter_timeout_ms);

    // Normalize requireds: tokenize and drop stop/domain-stop words.
    let must_tokens: Vec<String> = params
        .must
        .iter()
        .flat_map(|m| text::tokenize(m))
        .filter(|t| !ctx.stoplist.contains(t))
        .collect();
    let must_phrases = params.must_phrases.clone();

    let pool = params.pool.max(params.top_k * 6);

    // One query embedding per request, reused everywhere downstream.
    let query_vector = ctx.embedder.embed(&params.q)?;

    let dense_fut = dense_adapter(ctx, &params, &collection, &query_vector, pool, adapter_timeout);
    let sparse_fut = sparse_adapter(
        ctx,
        &params,
        &must_tokens,
        &must_phrases,
        pool,
        adapter_timeout,
    );
    let ((dense_outcome, dense_hits), sparse_outcome) = tokio::join!(dense_fut, sparse_fut);

    // A failed adapter degrades to "signal disabled" only when the other
    // signal returned; if every attempted signal failed, the request is a
    // transient error rather than a silently empty answer.
    let any_ranked = matches!(dense_outcome, AdapterOutcome::Ranked(_))
        || matches!(sparse_outcome, AdapterOutcome::Ranked(_));
    let any_failed = matches!(dense_outcome, AdapterOutcome::Failed)
        || matches!(sparse_outcome, AdapterOutcome::Failed);
    if any_failed && !any_ranked {
        return Err(RetrieveError::Transient(
            "all retrieval signals failed".to_string(),
        ));
    }

    let dense_ids = match &dense_outcome {
        AdapterOutcome::Ranked(ids) => ids.clone(),
        _ => Vec::new(),
    };
    let sparse_ids = match &sparse_outcome {
        AdapterOutcome::Ranked(ids) => ids.clone(),
        _ => Vec::new(),
    };

    let mut rank_maps = Vec::new();
    if !dense_ids.is_empty() {
        rank_maps.push(rank_map(dense_ids.iter().cloned()));
    }
    if !sparse_ids.is_empty() {
        rank_maps.push(rank_map(sparse_ids.iter().cloned()));
    }
    let fused = reciprocal_rank_fusion(&rank_maps);

    let mut debug = RetrieveDebug {
        pool_sizes: PoolSizes {
            dense: dense_ids.len(),
            sparse: sparse_ids.len(),
            fused: fused.len(),
            candidates: 0,
            post_filter_kept: 0,
        },
        signal: params.signal,
        dense_available: matches!(dense_outcome, AdapterOutcome::Ranked(_)),
        sparse_available: matches!(sparse_outcome, AdapterOutcome::Ranked(_)),
    };

    if fused.is_empty() {
        return Ok(RetrieveResponse {
            query: params.q,
            app: params.app,
            top_k: params.top_k,
            results: Vec::new(),
            debug,
        });
    }

    // Hydrate the fused head in order; ids the store no longer knows are
    // silently dropped.
    let fused_head: Vec<String> = fused.iter().take(pool).map(|(cid, _)| cid.clone()).collect();
    let missing: Vec<String> = fused_head
        .iter()
        .filter(|cid| !dense_hits.contains_key(*cid))
        .cloned()
        .collect();
    let mut hydrated = dense_hits;
    if !missing.is_empty() {
        let fetched = ctx
            .store
            .get_by_ids(&collection, &missing)
            .await
            .map_err(RetrieveError::Internal)?;
        for hit in fetched {
            hydrated.insert(hit.cid.clone(), hit);
        }
    }

    let mut candidates: Vec<Candidate> = Vec::with_capacity(fused_head.len());
    for cid in &fused_head {
        if let Some(hit) = hydrated.remove(cid) {
            let report = coverage_report(&hit.preview, &must_tokens, &must_phrases, params.proximity);
            candidates.push(Candidate {
                cid: hit.cid,
                document: hit.preview,
                metadata: hit.metadata,
                report,
            });
        }
    }
    debug.pool_sizes.candidates = candidates.len();

    // Strict constraint pass; fall back to the unfiltered pool rather than
    // returning nothing while candidates exist.
    let kept: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| passes_filter(&c.report, &must_tokens, &must_phrases, params.min_hits))
        .map(|(i, _)| i)
        .collect();
    let surviving: Vec<usize> = if kept.is_empty() {
        (0..candidates.len()).collect()
    } else {
        kept
    };
    debug.pool_sizes.post_filter_kept = surviving.len();

    if surviving.is_empty() {
        return Ok(RetrieveResponse {
            query: params.q,
            app: params.app,
            top_k: params.top_k,
            results: Vec::new(),
            debug,
        });
    }

    // Re-embed what the caller will actually see (previews may be shorter
    // than the vectors stored at ingest time).
    let texts: Vec<&str> = surviving
        .iter()
        .map(|&i| candidates[i].document.as_str())
        .collect();
    let vectors = ctx.embedder.embed_batch(&texts)?;

    let blended: Vec<f32> = surviving
        .iter()
        .zip(&vectors)
        .map(|(&i, v)| {
            RELEVANCE_WEIGHT * cosine(v, &query_vector)
                + COVERAGE_WEIGHT * candidates[i].report.coverage
        })
        .collect();

    // Shortlist by blended score, then diversify with MMR.
    let mut order: Vec<usize> = (0..surviving.len()).collect();
    order.sort_by(|&a, &b| {
        blended[b]
            .partial_cmp(&blended[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    order.truncate((params.top_k * 3).max(SHORTLIST_FLOOR));

    let shortlist_vectors: Vec<Vec<f32>> = order.iter().map(|&i| vectors[i].clone()).collect();
    let top_n = params.top_k.min(order.len());
    let picked = mmr_select(&shortlist_vectors, &query_vector, top_n, MMR_LAMBDA);

    let results: Vec<RetrievedDoc> = picked
        .into_iter()
        .map(|shortlist_pos| {
            let candidate = &candidates[surviving[order[shortlist_pos]]];
            RetrievedDoc {
                id: candidate.cid.clone(),
                document: candidate.document.clone(),
                metadata: candidate.metadata.clone(),
                debug: ResultDebug {
                    coverage: (candidate.report.coverage * 1000.0).round() / 1000.0,
                    token_hits: candidate.report.token_hits.clone(),
                    phrase_hits: candidate.report.phrase_hits.clone(),
                },
            }
        })
        .collect();

    Ok(RetrieveResponse {
        query: params.q,
        app: params.app,
        top_k: params.top_k,
        results,
        debug,
    })
}

async fn dense_adapter(
    ctx: &RetrievalContext,
    params: &RetrieveParams,
    collection: &str,
    query_vector: &[f32],
    pool: usize,
    adapter_timeout: Duration,
) -> (AdapterOutcome, HashMap<String, VectorHit>) {
    if !params.signal.wants_dense() {
        return (AdapterOutcome::Unavailable, HashMap::new());
    }
    if !ctx.store.has_collection(collection).await {
        tracing::warn!(collection, "Vector collection missing, dense signal unavailable");
        return (AdapterOutcome::Unavailable, HashMap::new());
    }

    match timeout(adapter_timeout, ctx.store.query(collection, query_vector, pool)).await {
        Ok(Ok(hits)) => {
            let ids: Vec<String> = hits.iter().map(|h| h.cid.clone()).collect();
            let by_id: HashMap<String, VectorHit> =
                hits.into_iter().map(|h| (h.cid.clone(), h)).collect();
            (AdapterOutcome::Ranked(ids), by_id)
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Dense adapter failed");
            (AdapterOutcome::Failed, HashMap::new())
        }
        Err(_) => {
            tracing::warn!(timeout_ms = adapter_timeout.as_millis() as u64, "Dense adapter timed out");
            (AdapterOutcome::Failed, HashMap::new())
        }
    }
}

async fn sparse_adapter(
    ctx: &RetrievalContext,
    params: &RetrieveParams,
    must_tokens: &[String],
    must_phrases: &[String],
    pool: usize,
    adapter_timeout: Duration,
) -> AdapterOutcome {
    if !params.signal.wants_sparse() {
        return AdapterOutcome::Unavailable;
    }
    let Some(lexical) = ctx.lexical_for_app(&params.app) else {
        tracing::warn!(app = %params.app, "Lexical index missing, sparse signal unavailable");
        return AdapterOutcome::Unavailable;
    };

    let base_tokens: Vec<String> = text::tokenize(&params.q)
        .into_iter()
        .filter(|t| !ctx.stoplist.contains(t))
        .take(BASE_QUERY_TOKEN_LIMIT)
        .collect();
    let phrases: Vec<Vec<String>> = must_phrases
        .iter()
        .map(|p| text::tokenize(p))
        .filter(|p| !p.is_empty())
        .collect();
    let plan = LexicalQueryPlan {
        base_tokens,
        must_tokens: must_tokens.to_vec(),
        phrases,
        proximity: params.proximity as u32,
    };

    // Tantivy searches are synchronous; run them on the blocking pool so the
    // timeout can preempt and the dense adapter keeps making progress.
    let search = tokio::task::spawn_blocking(move || lexical.search_ranked(&plan, pool));
    match timeout(adapter_timeout, search).await {
        Ok(Ok(Ok(hits))) => AdapterOutcome::Ranked(hits.into_iter().map(|(id, _)| id).collect()),
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "Sparse adapter failed");
            AdapterOutcome::Failed
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Sparse adapter task aborted");
            AdapterOutcome::Failed
        }
        Err(_) => {
            tracing::warn!(timeout_ms = adapter_timeout.as_millis() as u64, "Sparse adapter timed out");
            AdapterOutcome::Failed
        }
    }
}

/// Map an app to its collection; unknown apps fall back to the first
/// configured collection, matching the offline build's partitioning.
fn resolve_collection(ctx: &RetrievalContext, app: &str) -> Result<String, RetrieveError> {
    if let Some(name) = ctx.config.collection_for_app(app) {
        return Ok(name.to_string());
    }
    ctx.config
        .collections
        .first()
        .map(|c| c.name.clone())
        .ok_or_else(|| RetrieveError::BadRequest("no collections configured".to_string()))
}

/// Chunks from the same file within `radius` of `seq_idx`, in reading order.
pub async fn neighbors(
    ctx: &RetrievalContext,
    app: &str,
    source_path: &str,
    seq_idx: u32,
    radius: u32,
    limit: usize,
) -> Result<Vec<ChunkDoc>, RetrieveError> {
    let collection = resolve_collection(ctx, app)?;

    let Some(index) = ctx.neighbors_for_app(app) else {
        return Ok(Vec::new());
    };

    let entries = index.lookup(source_path, seq_idx, radius, limit);
    let cids: Vec<String> = entries.iter().map(|e| e.cid.clone()).collect();
    hydrate_ordered(ctx, &collection, &cids).await
}

/// Fetch chunks by id, preserving request order; unknown ids are omitted.
pub async fn by_ids(
    ctx: &RetrievalContext,
    app: &str,
    ids: &[String],
) -> Result<Vec<ChunkDoc>, RetrieveError> {
    let collection = resolve_collection(ctx, app)?;
    hydrate_ordered(ctx, &collection, ids).await
}

async fn hydrate_ordered(
    ctx: &RetrievalContext,
    collection: &str,
    cids: &[String],
) -> Result<Vec<ChunkDoc>, RetrieveError> {
    if cids.is_empty() || !ctx.store.has_collection(collection).await {
        return Ok(Vec::new());
    }

    let hits = ctx
        .store
        .get_by_ids(collection, cids)
        .await
        .map_err(RetrieveError::Internal)?;
    let mut by_id: HashMap<String, VectorHit> =
        hits.into_iter().map(|h| (h.cid.clone(), h)).collect();

    Ok(cids
        .iter()
        .filter_map(|cid| by_id.remove(cid))
        .map(|hit| ChunkDoc {
            id: hit.cid,
            document: hit.preview,
            metadata: hit.metadata,
        })
        .collect())
}

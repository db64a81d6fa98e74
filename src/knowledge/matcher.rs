//! 지식 매칭 - 질의어 확장 + 부분 일치 스코어링
//!
//! 1. 완전 일치: 소문자 질의 전체가 레코드 텍스트에 포함되면 100점 (exact)
//! 2. 의미 일치: 동의어로 확장한 의미 단어별 점수 합산 (semantic)
//!    - 단어가 텍스트에 포함: +2
//!    - 아니면 텍스트 토큰마다 부분 포함 또는 문자 집합 Jaccard > 0.7: +1
//!    - 최종 = 점수 / 의미 단어 수 x 100, 30 이상만 후보
//!
//! 상위 3개를 "Q: ...\nA: ..." 블록으로 묶어 AI 프롬프트 컨텍스트로 씁니다.
//!
//! ref: https://en.wikipedia.org/wiki/Jaccard_index

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use super::record::KnowledgeRecord;

/// 반환할 최대 후보 수
pub const MAX_RESULTS: usize = 3;

/// 의미 일치 최소 점수
pub const SEMANTIC_THRESHOLD: f64 = 30.0;

/// 완전 일치 점수 (의미 점수 상한)
pub const EXACT_SCORE: f64 = 100.0;

/// 부분 일치 Jaccard 기준
const SIMILARITY_THRESHOLD: f64 = 0.7;

/// 동의어 표 (단방향)
const SYNONYMS: &[(&str, &[&str])] = &[
    ("rektor", &["kepala", "pimpinan", "pemimpin", "direktur", "ketua"]),
    ("universitas", &["kampus", "perguruan tinggi", "univ", "pt"]),
    ("prabumulih", &["prabumullih"]),
    ("nama", &["siapa", "namanya", "identitas"]),
    ("tau", &["tahu", "kenal", "mengetahui"]),
    ("dari", &["di", "pada", "untuk"]),
    ("adalah", &["yaitu", "ialah", "merupakan"]),
    ("logo", &["lambang", "simbol", "emblem"]),
];

/// 불용어
const STOP_WORDS: &[&str] = &[
    "yang", "adalah", "dan", "atau", "di", "ke", "dari", "untuk", "dengan", "pada", "dalam",
    "ini", "itu", "ya", "sih", "kah", "ga", "tidak", "bukan", "kan", "dong", "kok", "gimana",
    "bagaimana", "apa", "kapan", "dimana",
];

// ============================================================================
// Types
// ============================================================================

/// 일치 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Semantic,
}

impl MatchType {
    /// 같은 점수일 때 정렬 우선순위 (작을수록 먼저)
    fn priority(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::Semantic => 1,
        }
    }
}

/// 매칭 후보
#[derive(Debug, Clone, Serialize)]
pub struct MatchCandidate {
    pub record: KnowledgeRecord,
    /// 0~100
    pub score: f64,
    pub match_type: MatchType,
    /// 진단용 (`word` 또는 `word~token`)
    pub matched_terms: Vec<String>,
}

/// 검색 결과 (AI 프롬프트 컨텍스트)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// 빈 줄로 구분된 컨텍스트 블록 (없으면 빈 문자열)
    pub context: String,
    /// 선택된 후보 중 첫 이미지 URL (없으면 빈 문자열)
    pub image_url: String,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }
}

// ============================================================================
// KnowledgeMatcher
// ============================================================================

/// 지식 매처
#[derive(Debug, Clone)]
pub struct KnowledgeMatcher {
    max_results: usize,
    stop_words: HashSet<&'static str>,
}

impl Default for KnowledgeMatcher {
    fn default() -> Self {
        Self::new(MAX_RESULTS)
    }
}

impl KnowledgeMatcher {
    pub fn new(max_results: usize) -> Self {
        Self {
            max_results,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// 질의 -> 컨텍스트 + 이미지
    ///
    /// 실패하지 않습니다. 후보가 없으면 빈 결과.
    pub fn search(&self, query: &str, corpus: &[KnowledgeRecord]) -> SearchResult {
        self.summarize(&self.rank(query, corpus))
    }

    /// 점수순 후보에서 상위 N개를 컨텍스트 + 이미지로 묶기
    pub fn summarize(&self, candidates: &[MatchCandidate]) -> SearchResult {
        let selected = &candidates[..candidates.len().min(self.max_results)];

        let context = selected
            .iter()
            .map(|c| c.record.context_text())
            .collect::<Vec<_>>()
            .join("\n\n");

        let image_url = selected
            .iter()
            .find_map(|c| c.record.image_url.clone().filter(|url| !url.is_empty()))
            .unwrap_or_default();

        tracing::debug!(
            "Knowledge search: {} candidates, returning {}",
            candidates.len(),
            selected.len()
        );

        SearchResult { context, image_url }
    }

    /// 점수순 전체 후보 목록
    ///
    /// 점수 내림차순, 같은 점수면 exact 먼저, 그다음 코퍼스 순서.
    /// 완전 일치는 다듬지 않은 소문자 질의 그대로 비교합니다.
    pub fn rank(&self, query: &str, corpus: &[KnowledgeRecord]) -> Vec<MatchCandidate> {
        if query.trim().is_empty() || corpus.is_empty() {
            return Vec::new();
        }
        let query_lower = query.to_lowercase();

        let meaningful = self.meaningful_words(&query_lower);
        tracing::debug!("Expanded search terms: {:?}", meaningful);

        let mut candidates: Vec<MatchCandidate> = corpus
            .iter()
            .filter_map(|record| self.score_record(&query_lower, &meaningful, record))
            .collect();

        // sort_by는 안정 정렬이므로 동점은 코퍼스 순서 유지
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.match_type.priority().cmp(&b.match_type.priority()))
        });

        candidates
    }

    /// 동의어 확장 -> 불용어/짧은 단어 제거
    pub fn meaningful_words(&self, query_lower: &str) -> BTreeSet<String> {
        let words: Vec<&str> = query_lower.split_whitespace().collect();

        let mut expanded: BTreeSet<&str> = words.iter().copied().collect();
        for word in &words {
            if let Some((_, related)) = SYNONYMS.iter().find(|(key, _)| key == word) {
                expanded.extend(related.iter().copied());
            }
        }

        expanded
            .into_iter()
            .filter(|w| !self.stop_words.contains(w) && w.chars().count() > 2)
            .map(String::from)
            .collect()
    }

    fn score_record(
        &self,
        query_lower: &str,
        meaningful: &BTreeSet<String>,
        record: &KnowledgeRecord,
    ) -> Option<MatchCandidate> {
        let haystack = record.haystack();

        if haystack.contains(query_lower) {
            tracing::debug!("Exact match: {}", record.id);
            return Some(MatchCandidate {
                record: record.clone(),
                score: EXACT_SCORE,
                match_type: MatchType::Exact,
                matched_terms: vec![query_lower.to_string()],
            });
        }

        if meaningful.is_empty() {
            return None;
        }

        let tokens: Vec<&str> = haystack.split_whitespace().collect();
        let mut points = 0u32;
        let mut matched_terms = Vec::new();

        for word in meaningful {
            if haystack.contains(word.as_str()) {
                points += 2;
                matched_terms.push(word.clone());
                continue;
            }

            if word.chars().count() <= 3 {
                continue;
            }

            for token in tokens.iter().filter(|t| t.chars().count() > 3) {
                let partial = word.contains(token)
                    || token.contains(word.as_str())
                    || char_similarity(word, token) > SIMILARITY_THRESHOLD;
                if partial {
                    points += 1;
                    matched_terms.push(format!("{}~{}", word, token));
                }
            }
        }

        let score = (f64::from(points) / meaningful.len() as f64 * 100.0).min(EXACT_SCORE);
        if score < SEMANTIC_THRESHOLD {
            return None;
        }

        tracing::debug!(
            "Semantic match: {} (score={:.1}, terms={:?})",
            record.id,
            score,
            matched_terms
        );

        Some(MatchCandidate {
            record: record.clone(),
            score,
            match_type: MatchType::Semantic,
            matched_terms,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 집합 Jaccard 유사도 (0.0 ~ 1.0)
///
/// 대소문자 무시. 한쪽이 비어 있으면 0.
pub fn char_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<char> = a.to_lowercase().chars().collect();
    let set_b: HashSet<char> = b.to_lowercase().chars().collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, question: &str, answer: &str, keywords: &str) -> KnowledgeRecord {
        KnowledgeRecord::from_value(
            id,
            &json!({"question": question, "answer": answer, "keywords": keywords}),
        )
        .unwrap()
    }

    fn with_image(mut record: KnowledgeRecord, url: &str) -> KnowledgeRecord {
        record.image_url = Some(url.to_string());
        record.image_public_id = Some(format!("knowledge/{}", record.id));
        record
    }

    #[test]
    fn test_empty_corpus_or_query() {
        let matcher = KnowledgeMatcher::default();
        assert_eq!(matcher.search("rektor", &[]), SearchResult::default());

        let corpus = vec![record("a", "Siapa rektor?", "Prof. Budi", "")];
        assert_eq!(matcher.search("", &corpus), SearchResult::default());
        assert_eq!(matcher.search("   ", &corpus), SearchResult::default());
    }

    #[test]
    fn test_exact_match_uses_untrimmed_query() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![
            record("joined", "Gedung rektorat", "Lantai 2", ""),
            record("spaced", "Info rektor", "Prof. Budi", ""),
        ];

        // "rektor "는 "info rektor prof. budi"에만 포함
        let ranked = matcher.rank("rektor ", &corpus);
        let exact: Vec<&str> = ranked
            .iter()
            .filter(|c| c.match_type == MatchType::Exact)
            .map(|c| c.record.id.as_str())
            .collect();
        assert_eq!(exact, vec!["spaced"]);
        assert_eq!(ranked[0].matched_terms, vec!["rektor ".to_string()]);
    }

    #[test]
    fn test_informal_query_matches_semantically() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![record("a", "Siapa nama rektor?", "Prof. Budi", "rektor kampus")];

        let ranked = matcher.rank("kamu tau ga nama rektor", &corpus);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].match_type, MatchType::Semantic);
        assert!(ranked[0].score >= SEMANTIC_THRESHOLD);
        assert!(ranked[0].matched_terms.contains(&"rektor".to_string()));

        let result = matcher.search("kamu tau ga nama rektor", &corpus);
        assert_eq!(result.context, "Q: Siapa nama rektor?\nA: Prof. Budi");
        assert_eq!(result.image_url, "");
    }

    #[test]
    fn test_question_text_is_exact_match() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![
            record("a", "Kapan jadwal UTS?", "Minggu ke-8", ""),
            record("b", "Siapa nama rektor?", "Prof. Budi", ""),
        ];

        let ranked = matcher.rank("SIAPA NAMA REKTOR?", &corpus);
        assert_eq!(ranked[0].record.id, "b");
        assert_eq!(ranked[0].score, EXACT_SCORE);
        assert_eq!(ranked[0].match_type, MatchType::Exact);
    }

    #[test]
    fn test_typo_matches_through_similarity() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![record("a", "Dimana lokasi kampus?", "Di Prabumullih", "")];

        let ranked = matcher.rank("universitas prabumulih", &corpus);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].match_type, MatchType::Semantic);
        assert!(ranked[0]
            .matched_terms
            .contains(&"prabumulih~prabumullih".to_string()));
    }

    #[test]
    fn test_unrelated_query_has_no_candidates() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![record("a", "Siapa nama rektor?", "Prof. Budi", "")];

        assert!(matcher.rank("resep nasi goreng enak", &corpus).is_empty());
        assert!(matcher.search("resep nasi goreng enak", &corpus).is_empty());
    }

    #[test]
    fn test_context_limited_to_three() {
        let matcher = KnowledgeMatcher::default();
        let corpus: Vec<KnowledgeRecord> = (0..5)
            .map(|i| record(&format!("k{}", i), &format!("Beasiswa {}", i), "Info beasiswa", ""))
            .collect();

        let ranked = matcher.rank("beasiswa", &corpus);
        assert_eq!(ranked.len(), 5);

        let result = matcher.search("beasiswa", &corpus);
        assert_eq!(result.context.split("\n\n").count(), 3);
        // 동점은 코퍼스 순서
        assert!(result.context.starts_with("Q: Beasiswa 0"));
    }

    #[test]
    fn test_image_from_first_selected_candidate() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![
            record("a", "Logo kampus", "Biru", ""),
            with_image(record("b", "Logo fakultas", "Merah", ""), "https://img/b.png"),
            with_image(record("c", "Logo himpunan", "Hijau", ""), "https://img/c.png"),
        ];

        let result = matcher.search("logo", &corpus);
        assert_eq!(result.image_url, "https://img/b.png");
    }

    #[test]
    fn test_image_outside_top_three_is_ignored() {
        let matcher = KnowledgeMatcher::new(1);
        let corpus = vec![
            record("a", "Logo kampus", "Biru", ""),
            with_image(record("b", "Logo fakultas", "Merah", ""), "https://img/b.png"),
        ];

        let result = matcher.search("logo", &corpus);
        assert_eq!(result.image_url, "");
    }

    #[test]
    fn test_semantic_score_capped_and_exact_wins_ties() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![
            record("repeat", "Rektor", "rektor rektor", ""),
            record("exact", "Gedung rektorat", "Lantai 2", ""),
        ];

        let ranked = matcher.rank("rektorat", &corpus);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].record.id, "exact");
        assert_eq!(ranked[1].record.id, "repeat");
        assert_eq!(ranked[1].score, EXACT_SCORE);
        assert_eq!(ranked[1].match_type, MatchType::Semantic);
    }

    #[test]
    fn test_score_grows_with_matched_words() {
        let matcher = KnowledgeMatcher::default();
        let corpus = vec![
            record("one", "Biaya kuliah", "Lihat portal", ""),
            record("two", "Biaya kuliah semester", "Lihat portal", ""),
        ];

        let ranked = matcher.rank("biaya semester genap", &corpus);
        let score = |id: &str| {
            ranked
                .iter()
                .find(|c| c.record.id == id)
                .map(|c| c.score)
                .unwrap_or(0.0)
        };
        assert!(score("two") > score("one"));
    }

    #[test]
    fn test_meaningful_words() {
        let matcher = KnowledgeMatcher::default();
        let words = matcher.meaningful_words("siapa rektor di kampus ya");

        assert!(words.contains("rektor"));
        assert!(words.contains("pimpinan"));
        assert!(words.contains("kampus"));
        assert!(!words.contains("di"));
        assert!(!words.contains("ya"));
    }

    #[test]
    fn test_char_similarity() {
        assert_eq!(char_similarity("", "abc"), 0.0);
        assert_eq!(char_similarity("abc", ""), 0.0);
        assert_eq!(char_similarity("rektor", "rektor"), 1.0);
        assert_eq!(
            char_similarity("kampus", "kamu"),
            char_similarity("kamu", "kampus")
        );
        assert!((char_similarity("abcd", "abef") - 2.0 / 6.0).abs() < 1e-9);
    }
}

//! Keyword intent classifier.
//!
//! Deterministic and pure: the verdict depends only on the query text and the
//! fixed keyword bags below. Confidence is `matched / bag_size` for the
//! winning intent; ties go to the intent declared first in [`Intent::ALL`].

use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    List,
    Filter,
    Count,
    Statistics,
    Trend,
    Ranking,
    Location,
    Distance,
    Heatmap,
    Scoring,
    Category,
    Help,
    Unknown,
}

impl Intent {
    /// Declaration order; ties are broken by position in this list.
    pub const ALL: [Intent; 13] = [
        Intent::List,
        Intent::Filter,
        Intent::Count,
        Intent::Statistics,
        Intent::Trend,
        Intent::Ranking,
        Intent::Location,
        Intent::Distance,
        Intent::Heatmap,
        Intent::Scoring,
        Intent::Category,
        Intent::Help,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::List => "list",
            Intent::Filter => "filter",
            Intent::Count => "count",
            Intent::Statistics => "statistics",
            Intent::Trend => "trend",
            Intent::Ranking => "ranking",
            Intent::Location => "location",
            Intent::Distance => "distance",
            Intent::Heatmap => "heatmap",
            Intent::Scoring => "scoring",
            Intent::Category => "category",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }

    /// Intents whose natural output is a map layer.
    pub fn is_spatial(&self) -> bool {
        matches!(self, Intent::Location | Intent::Distance | Intent::Heatmap)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Intent::List => "Menampilkan daftar data",
            Intent::Filter => "Menyaring data berdasarkan kriteria",
            Intent::Count => "Menghitung jumlah data",
            Intent::Statistics => "Ringkasan statistik / agregasi",
            Intent::Trend => "Perkembangan data dari waktu ke waktu",
            Intent::Ranking => "Peringkat data tertinggi / terendah",
            Intent::Location => "Menampilkan lokasi di peta",
            Intent::Distance => "Pencarian berdasarkan jarak / radius",
            Intent::Heatmap => "Peta kepadatan (heatmap)",
            Intent::Scoring => "Informasi skor dan penilaian",
            Intent::Category => "Pengelompokan berdasarkan kategori",
            Intent::Help => "Bantuan penggunaan",
            Intent::Unknown => "Maksud pertanyaan tidak dikenali",
        }
    }

    /// Keyword and synonym-phrase bag. `Unknown` has none and never wins by score.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::List => &[
                "tampilkan",
                "daftar",
                "tunjukkan",
                "lihat",
                "semua",
                "list",
                "siapa saja",
            ],
            Intent::Filter => &[
                "dengan",
                "yang",
                "dimana",
                "di mana",
                "berdasarkan",
                "hanya",
                "khusus",
                "status",
                "jenis kelamin",
                "laki-laki",
                "perempuan",
                "tinggal di",
            ],
            Intent::Count => &[
                "berapa",
                "jumlah",
                "total",
                "hitung",
                "banyaknya",
                "ada berapa",
                "count",
            ],
            Intent::Statistics => &[
                "rata-rata",
                "rata rata",
                "rerata",
                "statistik",
                "distribusi",
                "persentase",
                "median",
                "per provinsi",
                "per kabupaten",
                "ringkasan",
            ],
            Intent::Trend => &[
                "tren",
                "trend",
                "perkembangan",
                "dari tahun ke tahun",
                "per tahun",
                "pertumbuhan",
                "kenaikan",
                "penurunan",
            ],
            Intent::Ranking => &[
                "tertinggi",
                "terendah",
                "teratas",
                "terbawah",
                "top",
                "ranking",
                "peringkat",
                "paling",
                "skor tertinggi",
                "skor terendah",
            ],
            Intent::Location => &["lokasi", "peta", "koordinat", "letak", "posisi"],
            Intent::Distance => &[
                "jarak",
                "radius",
                "terdekat",
                "sekitar",
                "km",
                "kilometer",
                "dalam radius",
            ],
            Intent::Heatmap => &[
                "heatmap",
                "heat map",
                "peta panas",
                "kepadatan",
                "konsentrasi",
                "densitas",
            ],
            Intent::Scoring => &["skor", "score", "nilai", "penilaian", "bobot", "poin"],
            Intent::Category => &[
                "kategori",
                "golongan",
                "klasifikasi",
                "kelompok",
                "miskin",
                "rentan",
                "layak",
            ],
            Intent::Help => &[
                "bantuan",
                "help",
                "cara",
                "bagaimana",
                "contoh",
                "panduan",
                "apa yang bisa",
            ],
            Intent::Unknown => &[],
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- entity tags ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityTag {
    Santri,
    Pesantren,
    Orangtua,
    Rumah,
    Aset,
    Kesehatan,
    Pembiayaan,
    Lokasi,
    Score,
}

impl EntityTag {
    pub const ALL: [EntityTag; 9] = [
        EntityTag::Santri,
        EntityTag::Pesantren,
        EntityTag::Orangtua,
        EntityTag::Rumah,
        EntityTag::Aset,
        EntityTag::Kesehatan,
        EntityTag::Pembiayaan,
        EntityTag::Lokasi,
        EntityTag::Score,
    ];

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            EntityTag::Santri => &["santri", "siswa", "murid", "pelajar"],
            EntityTag::Pesantren => &["pesantren", "pondok", "ponpes"],
            EntityTag::Orangtua => &["orang tua", "orangtua", "ayah", "ibu", "wali"],
            EntityTag::Rumah => &["rumah", "hunian", "tempat tinggal"],
            EntityTag::Aset => &["aset", "kendaraan", "tanah", "ternak"],
            EntityTag::Kesehatan => &["kesehatan", "sakit", "penyakit", "disabilitas"],
            EntityTag::Pembiayaan => &["pembiayaan", "biaya", "beasiswa", "spp"],
            EntityTag::Lokasi => &[
                "lokasi", "provinsi", "kabupaten", "kecamatan", "desa", "kota", "wilayah",
            ],
            EntityTag::Score => &["skor", "score", "nilai", "kemiskinan", "miskin", "kelayakan"],
        }
    }
}

// ---------- verdict ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentVerdict {
    pub intent: Intent,
    pub confidence: f64,
    pub matched_keywords: BTreeSet<String>,
    pub entity_types: BTreeSet<EntityTag>,
    pub description: String,
}

impl IntentVerdict {
    fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0.0,
            matched_keywords: BTreeSet::new(),
            entity_types: BTreeSet::new(),
            description: Intent::Unknown.description().to_string(),
        }
    }

    /// Same verdict with a different intent (confidence and entities kept).
    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self.description = intent.description().to_string();
        self
    }
}

/// Lowercase and collapse whitespace runs to single spaces.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn classify(text: &str) -> IntentVerdict {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return IntentVerdict::unknown();
    }

    let mut matched_keywords = BTreeSet::new();
    let mut best: Option<(Intent, f64)> = None;

    for intent in Intent::ALL {
        let bag = intent.keywords();
        if bag.is_empty() {
            continue;
        }
        let mut matches = 0usize;
        for token in bag {
            if normalized.contains(token) {
                matches += 1;
                matched_keywords.insert((*token).to_string());
            }
        }
        if matches == 0 {
            continue;
        }
        let confidence = (matches as f64 / bag.len() as f64).min(1.0);
        // Strict `>` keeps the earlier-declared intent on ties.
        if best.is_none_or(|(_, c)| confidence > c) {
            best = Some((intent, confidence));
        }
    }

    let entity_types = EntityTag::ALL
        .into_iter()
        .filter(|tag| tag.keywords().iter().any(|k| normalized.contains(k)))
        .collect();

    match best {
        Some((intent, confidence)) => IntentVerdict {
            intent,
            confidence,
            matched_keywords,
            entity_types,
            description: intent.description().to_string(),
        },
        None => IntentVerdict {
            entity_types,
            ..IntentVerdict::unknown()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_query() {
        let v = classify("Berapa jumlah santri?");
        assert_eq!(v.intent, Intent::Count);
        assert!(v.matched_keywords.contains("berapa"));
        assert!(v.matched_keywords.contains("jumlah"));
        assert!(v.entity_types.contains(&EntityTag::Santri));
        assert!((v.confidence - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_query() {
        let v = classify("10 santri dengan skor tertinggi");
        assert_eq!(v.intent, Intent::Ranking);
        assert!(v.entity_types.contains(&EntityTag::Score));
        // "dengan" and "skor" still show up for observability
        assert!(v.matched_keywords.contains("dengan"));
        assert!(v.matched_keywords.contains("skor"));
    }

    #[test]
    fn location_query() {
        let v = classify("Tampilkan lokasi santri miskin");
        assert_eq!(v.intent, Intent::Location);
        assert!(v.entity_types.contains(&EntityTag::Lokasi));
        assert!(v.entity_types.contains(&EntityTag::Santri));
    }

    #[test]
    fn heatmap_and_distance_queries() {
        assert_eq!(classify("heatmap kepadatan santri").intent, Intent::Heatmap);
        assert_eq!(
            classify("pesantren terdekat dalam radius 5 km").intent,
            Intent::Distance
        );
    }

    #[test]
    fn statistics_and_trend_queries() {
        assert_eq!(
            classify("rata-rata skor per provinsi").intent,
            Intent::Statistics
        );
        assert_eq!(
            classify("tren pertumbuhan pesantren per tahun").intent,
            Intent::Trend
        );
    }

    #[test]
    fn empty_query_is_unknown() {
        for text in ["", "   ", "\n\t"] {
            let v = classify(text);
            assert_eq!(v.intent, Intent::Unknown);
            assert_eq!(v.confidence, 0.0);
            assert!(v.matched_keywords.is_empty());
            assert!(v.entity_types.is_empty());
        }
    }

    #[test]
    fn unmatched_query_is_unknown_but_keeps_entities() {
        let v = classify("santri pondok");
        assert_eq!(v.intent, Intent::Unknown);
        assert_eq!(v.confidence, 0.0);
        assert!(v.entity_types.contains(&EntityTag::Santri));
        assert!(v.entity_types.contains(&EntityTag::Pesantren));
    }

    #[test]
    fn whitespace_and_case_do_not_matter() {
        let a = classify("10 santri dengan skor tertinggi");
        let b = classify("  10   SANTRI\tdengan  Skor\n tertinggi ");
        assert_eq!(a, b);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        // one hit each in bags of 7: list ("tampilkan") and count ("jumlah")
        let v = classify("tampilkan jumlah");
        assert_eq!(v.intent, Intent::List);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        let queries = [
            "tampilkan daftar semua santri, tunjukkan lihat list siapa saja",
            "berapa jumlah total hitung banyaknya ada berapa count",
            "lokasi peta koordinat letak posisi",
            "xyz",
        ];
        for q in queries {
            let v = classify(q);
            assert!((0.0..=1.0).contains(&v.confidence), "{q}: {}", v.confidence);
        }
        assert_eq!(classify("lokasi peta koordinat letak posisi").confidence, 1.0);
    }

    #[test]
    fn unknown_tokens_produce_no_tags() {
        assert!(classify("berapa jumlah unicorn").entity_types.is_empty());
    }
}

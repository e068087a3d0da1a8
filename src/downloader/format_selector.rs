// FormatSelector - maps (media kind, quality) to an engine format query
//
// Query shapes:
// - Audio / Playlist (Audio): best audio, quality ignored (always transcoded)
// - Video: best video under the height bound, single best stream as fallback
// - Both: pre-muxed stream under the bound first, then video+audio merge
//
// Pre-muxed first keeps the merge step (and its failure surface) out of the
// common path.

use super::models::{MediaKind, QualityTier};

/// Format selector for the extraction engine
pub struct FormatSelector;

impl FormatSelector {
    /// Build the engine format query. Total over both enums.
    pub fn select_format(kind: MediaKind, quality: QualityTier) -> String {
        let bound = Self::height_filter(quality);

        match kind {
            MediaKind::Audio | MediaKind::PlaylistAudio => "bestaudio/best".to_string(),
            MediaKind::Video => format!("bestvideo{bound}/best{bound}"),
            MediaKind::Both => {
                if bound.is_empty() {
                    "best/bestvideo+bestaudio".to_string()
                } else {
                    format!("best{bound}/bestvideo{bound}+bestaudio/best")
                }
            }
        }
    }

    /// Height constraint in engine filter syntax, empty for `Best`
    pub fn height_filter(quality: QualityTier) -> String {
        quality
            .max_height()
            .map(|h| format!("[height<={}]", h))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Whether any alternative in the query requires merging two streams
    fn requires_merge(query: &str) -> bool {
        query.split('/').any(|alt| alt.contains('+'))
    }

    /// Whether the first alternative is a single (pre-muxed or audio) stream
    fn prefers_single_stream(query: &str) -> bool {
        query
            .split('/')
            .next()
            .map_or(false, |first| !first.contains('+'))
    }

    #[test]
    fn test_total_and_deterministic() {
        for kind in MediaKind::ALL {
            for quality in QualityTier::ALL {
                let a = FormatSelector::select_format(kind, quality);
                let b = FormatSelector::select_format(kind, quality);
                assert!(!a.is_empty(), "{kind:?}/{quality:?} produced empty query");
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_audio_ignores_quality() {
        for quality in QualityTier::ALL {
            assert_eq!(
                FormatSelector::select_format(MediaKind::Audio, quality),
                "bestaudio/best"
            );
            assert_eq!(
                FormatSelector::select_format(MediaKind::PlaylistAudio, quality),
                "bestaudio/best"
            );
        }
    }

    #[test]
    fn test_video_bound() {
        assert_eq!(
            FormatSelector::select_format(MediaKind::Video, QualityTier::Res720),
            "bestvideo[height<=720]/best[height<=720]"
        );
        assert_eq!(
            FormatSelector::select_format(MediaKind::Video, QualityTier::Best),
            "bestvideo/best"
        );
    }

    #[test]
    fn test_both_prefers_premuxed() {
        for quality in QualityTier::ALL {
            let query = FormatSelector::select_format(MediaKind::Both, quality);
            assert!(prefers_single_stream(&query), "{query}");
            assert!(requires_merge(&query), "{query}");

            if let Some(h) = quality.max_height() {
                let premuxed = format!("best[height<={h}]");
                let merged = format!("bestvideo[height<={h}]+bestaudio");
                let p = query.find(&premuxed).unwrap();
                let m = query.find(&merged).unwrap();
                assert!(p < m);
            }
        }
        assert_eq!(
            FormatSelector::select_format(MediaKind::Both, QualityTier::Res1080),
            "best[height<=1080]/bestvideo[height<=1080]+bestaudio/best"
        );
        assert_eq!(
            FormatSelector::select_format(MediaKind::Both, QualityTier::Best),
            "best/bestvideo+bestaudio"
        );
    }
}

//! Background music catalog.

pub const DEFAULT_TRACK_ID: &str = "ambient-1";

const CATALOG: &[(&str, &str)] = &[
    (
        "sad-motivational",
        "/musics/sad-motivational-pop-rock-background-434657.mp3",
    ),
    ("fun-upbeat", "/musics/fun-upbeat-energetic-pop-rock-345251.mp3"),
    ("ambient-1", "/musics/ambient-1.mp3"),
    ("ambient-2", "/musics/ambient-2.mp3"),
    ("upbeat-1", "/musics/upbeat-1.mp3"),
    ("upbeat-2", "/musics/upbeat-2.mp3"),
    ("cinematic-1", "/musics/cinematic-1.mp3"),
    ("cinematic-2", "/musics/cinematic-2.mp3"),
    ("corporate-1", "/musics/corporate-1.mp3"),
    ("corporate-2", "/musics/corporate-2.mp3"),
];

pub fn track_path(id: &str) -> Option<&'static str> {
    CATALOG
        .iter()
        .find(|(track_id, _)| *track_id == id)
        .map(|(_, path)| *path)
}

/// Reference of the background track for a request. An explicit URL wins;
/// unknown catalog ids fall back to the default track.
pub fn resolve_music(music_url: Option<&str>, music_id: Option<&str>) -> Option<String> {
    if let Some(url) = music_url.map(str::trim).filter(|url| !url.is_empty()) {
        return Some(url.to_string());
    }
    let id = music_id.map(str::trim).filter(|id| !id.is_empty())?;
    track_path(id)
        .or_else(|| track_path(DEFAULT_TRACK_ID))
        .map(String::from)
}

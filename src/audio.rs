//! Озвучка частушек: gTTS-голос поверх зацикленной подложки с даккингом через ffmpeg.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::logging::compact;

const FFMPEG_TIMEOUT: Duration = Duration::from_secs(60);
const FFPROBE_TIMEOUT: Duration = Duration::from_secs(10);
const TTS_TIMEOUT: Duration = Duration::from_secs(30);
const CONVERT_TIMEOUT: Duration = Duration::from_secs(30);

pub const OUTPUT_SECONDS: f64 = 21.0;
pub const DEFAULT_BACKING_TYPE: &str = "garmon";
pub const DEFAULT_BACKING_VOLUME_DB: i32 = -10;
const FIRST_VOICE_DELAY_MS: u32 = 7000;
const SECOND_VOICE_DELAY_MS: u32 = 14000;
const USER_SAMPLE: &str = "Sample [music].mp3";
const BACKING_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg"];

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} не уложился в {secs} с")]
    Timeout { program: String, secs: u64 },
    #[error("{program} завершился с ошибкой: {stderr}")]
    Failed { program: String, stderr: String },
    #[error("нет ни одной подложки в {0}")]
    NoBacking(PathBuf),
    #[error("неизвестный режим даккинга: {0}")]
    UnknownDucking(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuckingPreset {
    #[default]
    Soft,
    Medium,
    Strong,
}

impl DuckingPreset {
    pub fn parse(raw: &str) -> Result<Self, AudioError> {
        match raw.trim().to_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "medium" => Ok(Self::Medium),
            "strong" => Ok(Self::Strong),
            other => Err(AudioError::UnknownDucking(other.to_string())),
        }
    }

    /// (порог dB, ratio, attack мс, release мс)
    pub fn params(self) -> (i32, u32, u32, u32) {
        match self {
            Self::Soft => (-20, 3, 50, 200),
            Self::Medium => (-15, 5, 30, 150),
            Self::Strong => (-10, 8, 20, 100),
        }
    }

    fn compressor(self) -> String {
        let (threshold, ratio, attack, release) = self.params();
        format!("acompressor=threshold={threshold}dB:ratio={ratio}:attack={attack}:release={release}")
    }
}

#[derive(Debug, Clone)]
pub struct MixOptions {
    pub backing_type: String,
    pub ducking: DuckingPreset,
    pub backing_volume_db: i32,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            backing_type: DEFAULT_BACKING_TYPE.to_string(),
            ducking: DuckingPreset::Soft,
            backing_volume_db: DEFAULT_BACKING_VOLUME_DB,
        }
    }
}

/// `-filter_complex` для одного или двух голосовых входов; подложка — последний вход.
pub fn filter_graph(two_voices: bool, ducking: DuckingPreset, backing_volume_db: i32) -> String {
    let compressor = ducking.compressor();
    if two_voices {
        format!(
            "[0]adelay={d1}|{d1},loudnorm,atempo=1.25[v1];\
             [1]adelay={d2}|{d2},loudnorm,atempo=1.25[v2];\
             [2]volume={backing_volume_db}dB,aloop=loop=-1:size=2e+09[backing];\
             [v1][v2]amix=inputs=2:dropout_transition=0[voice_all];\
             [backing]{compressor}[ducked];\
             [voice_all][ducked]amix=inputs=2:dropout_transition=0[out]",
            d1 = FIRST_VOICE_DELAY_MS,
            d2 = SECOND_VOICE_DELAY_MS,
        )
    } else {
        format!(
            "[0]adelay={d1}|{d1},loudnorm,atempo=1.25[voice];\
             [1]volume={backing_volume_db}dB,aloop=loop=-1:size=2e+09[backing];\
             [backing]{compressor}[ducked];\
             [voice][ducked]amix=inputs=2:dropout_transition=0[out]",
            d1 = FIRST_VOICE_DELAY_MS,
        )
    }
}

fn mix_args(voices: &[PathBuf], backing: &Path, graph: String, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into()];
    for input in voices.iter().map(PathBuf::as_path).chain(std::iter::once(backing)) {
        args.push("-i".into());
        args.push(input.into());
    }
    args.extend(
        [
            "-filter_complex".to_string(),
            graph,
            "-map".into(),
            "[out]".into(),
            "-t".into(),
            OUTPUT_SECONDS.to_string(),
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            "64k".into(),
            "-ar".into(),
            "48000".into(),
            "-ac".into(),
            "1".into(),
        ]
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

static STRESS_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\+([аеёиоуыэюя])").unwrap());
static LEADING_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-+").unwrap());
static LEADING_BANGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!+").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Разметка для TTS: `+` перед гласной (ударение) убирается, ведущие `-`/`!` тоже,
/// паузы удлиняются (`.` → `...`, `,` → `..`), пробелы схлопываются.
pub fn process_speech_marks(text: &str) -> String {
    let text = STRESS_MARK.replace_all(text, "$1");
    let text = LEADING_DASHES.replace(&text, "");
    let text = LEADING_BANGS.replace(&text, "");
    let text = text.replace('.', "...").replace(',', "..");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Четыре и больше непустых строк озвучиваются двумя половинами (1–2 и 3–4).
pub fn voice_parts(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() >= 4 {
        vec![lines[..2].join("\n"), lines[2..4].join("\n")]
    } else {
        vec![text.to_string()]
    }
}

pub fn classify_backing(path: &Path) -> &'static str {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if stem.contains("sample") && stem.contains("music") {
        "user_music"
    } else if stem.contains("garmon") || stem.contains("гармон") {
        "garmon"
    } else if stem.contains("balalaika") || stem.contains("балалайк") {
        "balalaika"
    } else if stem.contains("beat") || stem.contains("бит") {
        "beat"
    } else {
        "unknown"
    }
}

/// `Sample [music].mp3` → случайный `<type>*.{mp3,wav,ogg}` → первый файл каталога.
pub fn pick_backing<R: Rng + ?Sized>(files: &[PathBuf], backing_type: &str, rng: &mut R) -> Option<PathBuf> {
    let name_of = |p: &PathBuf| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    if let Some(sample) = files.iter().find(|p| name_of(p) == USER_SAMPLE) {
        return Some(sample.clone());
    }
    let typed: Vec<&PathBuf> = files
        .iter()
        .filter(|p| {
            let name = name_of(p);
            let ext_ok = p
                .extension()
                .map(|e| BACKING_EXTENSIONS.contains(&e.to_string_lossy().as_ref()))
                .unwrap_or(false);
            name.starts_with(backing_type) && ext_ok
        })
        .collect();
    match typed.choose(rng) {
        Some(path) => Some((*path).clone()),
        None => files.first().cloned(),
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, AudioError> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

async fn cleanup(files: &[PathBuf]) {
    for file in files {
        match tokio::fs::remove_file(file).await {
            Ok(()) => debug!(file = %file.display(), "Temp file removed"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(file = %file.display(), error = %err, "Failed to remove temp file"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioMixer {
    backing_dir: PathBuf,
    temp_dir: PathBuf,
    ffmpeg: String,
    ffprobe: String,
    gtts: String,
}

impl AudioMixer {
    pub fn new(assets_dir: impl AsRef<Path>) -> Self {
        let assets = assets_dir.as_ref();
        Self {
            backing_dir: assets.join("backing"),
            temp_dir: assets.join("temp"),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            gtts: "gtts-cli".to_string(),
        }
    }

    pub fn with_programs(
        mut self,
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
        gtts: impl Into<String>,
    ) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self.gtts = gtts.into();
        self
    }

    pub fn backing_dir(&self) -> &Path {
        &self.backing_dir
    }

    /// Создаёт `backing/` и `temp/`.
    pub async fn ensure_dirs(&self) -> Result<(), AudioError> {
        tokio::fs::create_dir_all(&self.backing_dir).await?;
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        Ok(())
    }

    fn temp_file(&self, prefix: &str, ext: &str) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen();
        self.temp_dir.join(format!("{prefix}_{suffix:08x}.{ext}"))
    }

    async fn run(&self, program: &str, args: &[OsString], limit: Duration) -> Result<Output, AudioError> {
        debug!(program, args = ?args, "Spawning");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| AudioError::Timeout {
                program: program.to_string(),
                secs: limit.as_secs(),
            })??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::Failed {
                program: program.to_string(),
                stderr: compact(stderr.trim(), 500),
            });
        }
        Ok(output)
    }

    /// Синтез gTTS в mp3 (русский, обычная скорость).
    pub async fn synthesize(&self, text: &str) -> Result<PathBuf, AudioError> {
        let processed = process_speech_marks(text);
        let file = self.temp_file("voice", "mp3");
        let args: Vec<OsString> = vec![
            processed.clone().into(),
            "--lang".into(),
            "ru".into(),
            "--output".into(),
            file.clone().into(),
        ];
        self.run(&self.gtts, &args, TTS_TIMEOUT).await?;
        info!(file = %file.display(), text = %compact(&processed, 50), "TTS saved");
        Ok(file)
    }

    /// Длительность в секундах; только для логов.
    pub async fn duration(&self, file: &Path) -> Option<f64> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "quiet".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "csv=p=0".into(),
            file.into(),
        ];
        match self.run(&self.ffprobe, &args, FFPROBE_TIMEOUT).await {
            Ok(out) => String::from_utf8_lossy(&out.stdout).trim().parse().ok(),
            Err(err) => {
                warn!(file = %file.display(), error = %err, "ffprobe failed");
                None
            }
        }
    }

    pub async fn backing_catalogue(&self) -> Result<BTreeMap<&'static str, Vec<PathBuf>>, AudioError> {
        let mut tracks: BTreeMap<&'static str, Vec<PathBuf>> = BTreeMap::new();
        for file in list_files(&self.backing_dir).await? {
            tracks.entry(classify_backing(&file)).or_default().push(file);
        }
        Ok(tracks)
    }

    async fn backing_track(&self, backing_type: &str) -> Result<PathBuf, AudioError> {
        let files = list_files(&self.backing_dir).await?;
        let picked = pick_backing(&files, backing_type, &mut rand::thread_rng());
        picked.ok_or_else(|| AudioError::NoBacking(self.backing_dir.clone()))
    }

    /// Озвученная частушка с подложкой: OGG/Opus, 21 секунда.
    pub async fn chastushka_audio(&self, text: &str, options: &MixOptions) -> Result<Vec<u8>, AudioError> {
        info!(
            text = %compact(text, 50),
            backing = %options.backing_type,
            ducking = ?options.ducking,
            "Mixing chastushka"
        );
        let backing = self.backing_track(&options.backing_type).await?;

        let mut voices = Vec::new();
        for part in voice_parts(text) {
            match self.synthesize(&part).await {
                Ok(file) => voices.push(file),
                Err(err) => {
                    cleanup(&voices).await;
                    return Err(err);
                }
            }
        }

        let output = self.temp_file("chastushka", "ogg");
        let mixed = self.mix(&voices, &backing, options, &output).await;
        cleanup(&voices).await;
        if let Err(err) = mixed {
            cleanup(std::slice::from_ref(&output)).await;
            return Err(err);
        }

        let bytes = tokio::fs::read(&output).await;
        cleanup(std::slice::from_ref(&output)).await;
        Ok(bytes?)
    }

    async fn mix(&self, voices: &[PathBuf], backing: &Path, options: &MixOptions, output: &Path) -> Result<(), AudioError> {
        if let Some(first) = voices.first() {
            if self.duration(first).await.is_none() {
                warn!("Voice duration unknown, mixing anyway");
            }
        }
        let graph = filter_graph(voices.len() > 1, options.ducking, options.backing_volume_db);
        let args = mix_args(voices, backing, graph, output);
        self.run(&self.ffmpeg, &args, FFMPEG_TIMEOUT).await?;
        info!(output = %output.display(), "Chastushka mixed");
        Ok(())
    }

    /// Только голос, без подложки: gTTS → ffmpeg (atempo 1.25, opus).
    pub async fn voice_only(&self, text: &str) -> Result<Vec<u8>, AudioError> {
        let voice = self.synthesize(text).await?;
        let output = self.temp_file("voice_only", "ogg");
        let args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            voice.clone().into(),
            "-filter:a".into(),
            "atempo=1.25".into(),
            "-c:a".into(),
            "libopus".into(),
            "-b:a".into(),
            "64k".into(),
            "-ar".into(),
            "48000".into(),
            "-ac".into(),
            "1".into(),
            output.clone().into(),
        ];
        let converted = self.run(&self.ffmpeg, &args, CONVERT_TIMEOUT).await;
        cleanup(std::slice::from_ref(&voice)).await;
        if let Err(err) = converted {
            cleanup(std::slice::from_ref(&output)).await;
            return Err(err);
        }
        let bytes = tokio::fs::read(&output).await;
        cleanup(std::slice::from_ref(&output)).await;
        Ok(bytes?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn single_voice_graph() {
        let graph = filter_graph(false, DuckingPreset::Soft, -10);
        assert_eq!(
            graph,
            "[0]adelay=7000|7000,loudnorm,atempo=1.25[voice];\
             [1]volume=-10dB,aloop=loop=-1:size=2e+09[backing];\
             [backing]acompressor=threshold=-20dB:ratio=3:attack=50:release=200[ducked];\
             [voice][ducked]amix=inputs=2:dropout_transition=0[out]"
        );
    }

    #[test]
    fn two_voice_graph_delays_second_half() {
        let graph = filter_graph(true, DuckingPreset::Strong, -12);
        assert!(graph.contains("[1]adelay=14000|14000,loudnorm,atempo=1.25[v2]"));
        assert!(graph.contains("[2]volume=-12dB"));
        assert!(graph.contains("[v1][v2]amix=inputs=2:dropout_transition=0[voice_all]"));
        assert!(graph.contains("threshold=-10dB:ratio=8:attack=20:release=100"));
        assert!(graph.ends_with("[voice_all][ducked]amix=inputs=2:dropout_transition=0[out]"));
    }

    #[test]
    fn ffmpeg_args_put_backing_last() {
        let voices = vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")];
        let args = mix_args(&voices, Path::new("garmon.mp3"), "G".into(), Path::new("out.ogg"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(&args[..7], &["-y", "-i", "a.mp3", "-i", "b.mp3", "-i", "garmon.mp3"]);
        assert!(args.windows(2).any(|w| w == ["-t", "21"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libopus"]));
        assert_eq!(args.last().map(String::as_str), Some("out.ogg"));
    }

    #[test]
    fn ducking_presets_parse() {
        assert_eq!(DuckingPreset::parse("Medium").unwrap().params(), (-15, 5, 30, 150));
        assert!(matches!(DuckingPreset::parse("loud"), Err(AudioError::UnknownDucking(_))));
    }

    #[test]
    fn speech_marks() {
        assert_eq!(process_speech_marks("--+Ехал  Гр+еку, через реку."), "Ехал Греку.. через реку...");
        assert_eq!(process_speech_marks("!!Быстро\nи чётко"), "Быстро и чётко");
        assert_eq!(process_speech_marks("2+2"), "2+2");
    }

    #[test]
    fn four_lines_split_in_halves() {
        let parts = voice_parts("раз\n\nдва\nтри\n четыре \nпять");
        assert_eq!(parts, vec!["раз\nдва".to_string(), "три\nчетыре".to_string()]);
        assert_eq!(voice_parts("раз\nдва"), vec!["раз\nдва".to_string()]);
    }

    #[test]
    fn backing_classification() {
        assert_eq!(classify_backing(Path::new("Sample [music].mp3")), "user_music");
        assert_eq!(classify_backing(Path::new("гармонь_1.ogg")), "garmon");
        assert_eq!(classify_backing(Path::new("beat-90bpm.wav")), "beat");
        assert_eq!(classify_backing(Path::new("noise.mp3")), "unknown");
    }

    #[test]
    fn backing_selection_order() {
        let mut rng = StepRng::new(0, 0);
        let files = vec![
            PathBuf::from("/b/balalaika.mp3"),
            PathBuf::from("/b/garmon1.mp3"),
            PathBuf::from("/b/garmon2.txt"),
        ];
        assert_eq!(pick_backing(&files, "garmon", &mut rng), Some(PathBuf::from("/b/garmon1.mp3")));
        assert_eq!(pick_backing(&files, "beat", &mut rng), Some(PathBuf::from("/b/balalaika.mp3")));

        let mut with_sample = files.clone();
        with_sample.push(PathBuf::from("/b/Sample [music].mp3"));
        assert_eq!(
            pick_backing(&with_sample, "garmon", &mut rng),
            Some(PathBuf::from("/b/Sample [music].mp3"))
        );
        assert_eq!(pick_backing(&[], "garmon", &mut rng), None);
    }

    #[tokio::test]
    async fn catalogue_and_missing_backing() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = AudioMixer::new(dir.path());
        mixer.ensure_dirs().await.unwrap();
        assert!(matches!(
            mixer.backing_track("garmon").await,
            Err(AudioError::NoBacking(_))
        ));

        tokio::fs::write(mixer.backing_dir().join("garmon.mp3"), b"x").await.unwrap();
        tokio::fs::write(mixer.backing_dir().join("beat.ogg"), b"x").await.unwrap();
        let catalogue = mixer.backing_catalogue().await.unwrap();
        assert_eq!(catalogue["garmon"].len(), 1);
        assert_eq!(catalogue["beat"].len(), 1);
        assert_eq!(
            mixer.backing_track("garmon").await.unwrap(),
            mixer.backing_dir().join("garmon.mp3")
        );
    }

    #[tokio::test]
    async fn subprocess_failures_are_typed() {
        let mixer = AudioMixer::new("unused");
        let err = mixer.run("false", &[], Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, AudioError::Failed { .. }));

        let err = mixer
            .run("sleep", &["5".into()], Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Timeout { .. }));

        let err = mixer
            .run("definitely-not-a-real-binary", &[], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Io(_)));
    }

    #[tokio::test]
    async fn failed_tts_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mixer = AudioMixer::new(dir.path()).with_programs("ffmpeg", "ffprobe", "false");
        mixer.ensure_dirs().await.unwrap();
        tokio::fs::write(mixer.backing_dir().join("garmon.mp3"), b"x").await.unwrap();

        let err = mixer
            .chastushka_audio("раз\nдва\nтри\nчетыре", &MixOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Failed { .. }));
        let leftovers = list_files(&dir.path().join("temp")).await.unwrap();
        assert!(leftovers.is_empty());
    }

    fn script(dir: &Path, name: &str, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn failed_mix_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let gtts = script(
            bin.path(),
            "gtts",
            "while [ $# -gt 0 ]; do [ \"$1\" = --output ] && echo mp3 > \"$2\"; shift; done\n",
        );
        let ffmpeg = script(bin.path(), "ffmpeg", "for last; do :; done\necho partial > \"$last\"\nexit 1\n");
        let mixer = AudioMixer::new(dir.path()).with_programs(ffmpeg.clone(), "false", gtts);
        mixer.ensure_dirs().await.unwrap();
        tokio::fs::write(mixer.backing_dir().join("garmon.mp3"), b"x").await.unwrap();

        let err = mixer
            .chastushka_audio("раз\nдва\nтри\nчетыре", &MixOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::Failed { program, .. } if program == ffmpeg));
        assert!(list_files(&dir.path().join("temp")).await.unwrap().is_empty());

        assert!(mixer.voice_only("привет").await.is_err());
        assert!(list_files(&dir.path().join("temp")).await.unwrap().is_empty());
    }
}

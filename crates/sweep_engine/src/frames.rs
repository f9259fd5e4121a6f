use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::extract::{text_of, HtmlNode};
use crate::surface::{Measurement, Surface, SurfaceError};

/// Replays captured HTML snapshots of a virtualized list, one per scroll position.
///
/// Any forward scroll moves one frame ahead and any backward scroll one frame
/// back, clamped to the recording. The last frame repeats forever, which is
/// what a fully loaded list looks like to the sweep.
pub struct HtmlFrameSurface {
    frames: Vec<String>,
    container: Selector,
    item: Selector,
    position: Mutex<usize>,
}

impl HtmlFrameSurface {
    pub fn new(frames: Vec<String>, container_css: &str, item_css: &str) -> Result<Self, SurfaceError> {
        let container = Selector::parse(container_css)
            .map_err(|_| SurfaceError::Selector(container_css.to_string()))?;
        let item =
            Selector::parse(item_css).map_err(|_| SurfaceError::Selector(item_css.to_string()))?;
        Ok(Self {
            frames,
            container,
            item,
            position: Mutex::new(0),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn position(&self) -> usize {
        self.position.lock().map(|pos| *pos).unwrap_or(0)
    }

    fn with_position<T>(&self, f: impl FnOnce(&mut usize) -> T) -> Result<T, SurfaceError> {
        let mut position = self
            .position
            .lock()
            .map_err(|_| SurfaceError::Other("frame cursor poisoned".to_string()))?;
        Ok(f(&mut position))
    }

    fn current_frame(&self) -> Result<Option<&str>, SurfaceError> {
        let position = self.with_position(|pos| *pos)?;
        Ok(self.frames.get(position).map(String::as_str))
    }

    fn items(&self) -> Result<Vec<(String, String)>, SurfaceError> {
        let Some(frame) = self.current_frame()? else {
            return Ok(Vec::new());
        };
        let doc = Html::parse_document(frame);
        let Some(container) = doc.select(&self.container).next() else {
            return Err(SurfaceError::Detached("scroll container vanished".to_string()));
        };
        Ok(container
            .select(&self.item)
            .map(|item| (item.html(), text_of(item)))
            .collect())
    }
}

#[async_trait]
impl Surface for HtmlFrameSurface {
    type Node = HtmlNode;

    async fn container_present(&self) -> Result<bool, SurfaceError> {
        let Some(frame) = self.current_frame()? else {
            return Ok(false);
        };
        Ok(Html::parse_document(frame)
            .select(&self.container)
            .next()
            .is_some())
    }

    async fn jump_to_start(&self) -> Result<(), SurfaceError> {
        self.with_position(|pos| *pos = 0)
    }

    async fn scroll_by(&self, delta: i64) -> Result<(), SurfaceError> {
        let last = self.frames.len().saturating_sub(1);
        self.with_position(|pos| {
            if delta > 0 {
                *pos = (*pos + 1).min(last);
            } else if delta < 0 {
                *pos = pos.saturating_sub(1);
            }
        })
    }

    async fn measure(&self) -> Result<Measurement, SurfaceError> {
        let items = self.items()?;
        let mut measurement = Measurement::count(items.len());
        if let (Some((_, first)), Some((_, last))) = (items.first(), items.last()) {
            measurement = measurement.with_marker(format!("{first}|{last}"));
        }
        Ok(measurement)
    }

    async fn visible_nodes(&self) -> Result<Vec<HtmlNode>, SurfaceError> {
        Ok(self
            .items()?
            .into_iter()
            .map(|(html, _)| HtmlNode::new(html))
            .collect())
    }
}

/// Loads every `*.html` file in `dir`, ordered by file name.
pub fn read_frames(dir: &Path) -> io::Result<Vec<String>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        })
        .collect();
    paths.sort();
    paths.iter().map(fs::read_to_string).collect()
}

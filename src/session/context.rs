use std::path::PathBuf;
use std::sync::Arc;

use image::RgbaImage;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use super::state::Shot;
use crate::config::{PrintingConfig, TextConfig};
use crate::error::SessionError;
use crate::processing::compositor::Compositor;

/// Phrase indices drawn once per session so no phrase repeats within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSelection {
    top: Vec<usize>,
    bottom: Vec<usize>,
}

impl TextSelection {
    fn draw(rng: &mut StdRng, texts: &TextConfig) -> Self {
        let pick = |rng: &mut StdRng, len: usize, wanted: usize| {
            index::sample(rng, len, wanted.min(len)).into_vec()
        };
        Self {
            top: pick(rng, texts.top_phrases.len(), TextConfig::TOP_PER_SESSION),
            bottom: pick(rng, texts.bottom_phrases.len(), TextConfig::BOTTOM_PER_SESSION),
        }
    }

    pub fn top(&self) -> &[usize] {
        &self.top
    }

    pub fn bottom(&self) -> &[usize] {
        &self.bottom
    }

    /// Praise for `slot`, or an empty string when the phrase list is shorter.
    pub fn top_phrase<'a>(&self, texts: &'a TextConfig, slot: usize) -> &'a str {
        phrase(&texts.top_phrases, &self.top, slot)
    }

    pub fn bottom_phrase<'a>(&self, texts: &'a TextConfig, slot: usize) -> &'a str {
        phrase(&texts.bottom_phrases, &self.bottom, slot)
    }
}

fn phrase<'a>(pool: &'a [String], picks: &[usize], slot: usize) -> &'a str {
    picks
        .get(slot)
        .and_then(|&i| pool.get(i))
        .map_or("", String::as_str)
}

/// Everything one guest's session accumulates between two visits to idle.
pub struct SessionContext {
    session_id: u64,
    frames: Vec<Arc<RgbaImage>>,
    composite: Option<Arc<RgbaImage>>,
    print_image: Option<Arc<RgbaImage>>,
    print_path: Option<PathBuf>,
    texts: TextSelection,
    requested_copies: u32,
    printed_copies: u32,
    default_copies: u32,
    max_copies: u32,
    phrases: TextConfig,
    rng: StdRng,
}

impl SessionContext {
    pub fn new(first_session_id: u64, printing: &PrintingConfig, phrases: &TextConfig, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let texts = TextSelection::draw(&mut rng, phrases);
        Self {
            session_id: first_session_id,
            frames: Vec::with_capacity(Shot::COUNT),
            composite: None,
            print_image: None,
            print_path: None,
            texts,
            requested_copies: printing.default_copies,
            printed_copies: 0,
            default_copies: printing.default_copies,
            max_copies: printing.max_copies,
            phrases: phrases.clone(),
            rng,
        }
    }

    /// Clear the previous guest's work and prepare a fresh session.
    pub fn reset(&mut self) {
        self.session_id += 1;
        self.frames.clear();
        self.composite = None;
        self.print_image = None;
        self.print_path = None;
        self.texts = TextSelection::draw(&mut self.rng, &self.phrases);
        self.requested_copies = self.default_copies;
        self.printed_copies = 0;
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn frames(&self) -> &[Arc<RgbaImage>] {
        &self.frames
    }

    /// Append the frame for the next shot.
    pub fn capture(&mut self, frame: Arc<RgbaImage>) -> Result<Shot, SessionError> {
        let shot = Shot::new(self.frames.len() as u8 + 1).ok_or(SessionError::TooManyFrames {
            max: Shot::COUNT,
        })?;
        self.frames.push(frame);
        Ok(shot)
    }

    /// Build the strip and print sheet from the three captured frames.
    pub fn composite(&mut self, compositor: &Compositor) -> Result<(), SessionError> {
        if self.frames.len() != Shot::COUNT {
            return Err(SessionError::IncompleteSession {
                have: self.frames.len(),
                needed: Shot::COUNT,
            });
        }
        let strip = compositor.compose_strip(&self.frames);
        let sheet = compositor.compose_print(&strip);
        self.composite = Some(Arc::new(strip));
        self.print_image = Some(Arc::new(sheet));
        Ok(())
    }

    pub fn composite_image(&self) -> Option<&Arc<RgbaImage>> {
        self.composite.as_ref()
    }

    pub fn print_image(&self) -> Option<&Arc<RgbaImage>> {
        self.print_image.as_ref()
    }

    pub fn print_path(&self) -> Option<&PathBuf> {
        self.print_path.as_ref()
    }

    pub fn set_print_path(&mut self, path: PathBuf) {
        self.print_path = Some(path);
    }

    pub fn texts(&self) -> &TextSelection {
        &self.texts
    }

    pub fn requested_copies(&self) -> u32 {
        self.requested_copies
    }

    pub fn printed_copies(&self) -> u32 {
        self.printed_copies
    }

    pub fn max_copies(&self) -> u32 {
        self.max_copies
    }

    /// Ask for one more copy. Returns the new total, or `None` at the limit.
    pub fn add_copy(&mut self) -> Option<u32> {
        if self.requested_copies >= self.max_copies {
            return None;
        }
        self.requested_copies += 1;
        Some(self.requested_copies)
    }

    pub fn set_printed_copies(&mut self, printed: u32) {
        self.printed_copies = printed.min(self.requested_copies);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::config::CompositeConfig;

    use super::*;

    fn context(seed: u64) -> SessionContext {
        SessionContext::new(1, &PrintingConfig::default(), &TextConfig::default(), Some(seed))
    }

    fn frame() -> Arc<RgbaImage> {
        Arc::new(RgbaImage::new(8, 8))
    }

    fn distinct(picks: &[usize]) -> bool {
        picks.iter().collect::<HashSet<_>>().len() == picks.len()
    }

    #[test]
    fn selections_are_distinct_and_in_range() {
        let texts = TextConfig::default();
        let mut ctx = context(7);
        for _ in 0..50 {
            let sel = ctx.texts().clone();
            assert_eq!(sel.top().len(), TextConfig::TOP_PER_SESSION);
            assert_eq!(sel.bottom().len(), TextConfig::BOTTOM_PER_SESSION);
            assert!(distinct(sel.top()) && distinct(sel.bottom()));
            assert!(sel.top().iter().all(|&i| i < texts.top_phrases.len()));
            assert!(sel.bottom().iter().all(|&i| i < texts.bottom_phrases.len()));
            ctx.reset();
        }
    }

    #[test]
    fn fourth_frame_is_rejected() {
        let mut ctx = context(1);
        for expected in 1..=3 {
            assert_eq!(ctx.capture(frame()).unwrap().number(), expected);
        }
        assert!(matches!(
            ctx.capture(frame()),
            Err(SessionError::TooManyFrames { max: 3 })
        ));
        assert_eq!(ctx.frames().len(), 3);
    }

    #[test]
    fn composite_requires_all_frames() {
        let compositor = Compositor::from_config(&CompositeConfig::default()).unwrap();
        let mut ctx = context(1);
        ctx.capture(frame()).unwrap();
        ctx.capture(frame()).unwrap();
        assert!(matches!(
            ctx.composite(&compositor),
            Err(SessionError::IncompleteSession { have: 2, needed: 3 })
        ));
        ctx.capture(frame()).unwrap();
        ctx.composite(&compositor).unwrap();
        assert_eq!(ctx.composite_image().unwrap().dimensions(), (620, 1748));
        assert_eq!(ctx.print_image().unwrap().dimensions(), (1240, 1748));
    }

    #[test]
    fn reset_restores_defaults() {
        let compositor = Compositor::from_config(&CompositeConfig::default()).unwrap();
        let mut ctx = context(3);
        for _ in 0..3 {
            ctx.capture(frame()).unwrap();
        }
        ctx.composite(&compositor).unwrap();
        ctx.set_print_path(PathBuf::from("/tmp/print.png"));
        ctx.add_copy();
        ctx.set_printed_copies(1);

        for round in 0..2 {
            ctx.reset();
            assert_eq!(ctx.session_id(), 2 + round);
            assert!(ctx.frames().is_empty());
            assert!(ctx.composite_image().is_none());
            assert!(ctx.print_image().is_none());
            assert!(ctx.print_path().is_none());
            assert_eq!(ctx.requested_copies(), 1);
            assert_eq!(ctx.printed_copies(), 0);
        }
    }

    #[test]
    fn copies_stop_at_max() {
        let mut ctx = context(1);
        assert_eq!(ctx.add_copy(), Some(2));
        assert_eq!(ctx.add_copy(), Some(3));
        assert_eq!(ctx.add_copy(), Some(4));
        assert_eq!(ctx.add_copy(), None);
        assert_eq!(ctx.requested_copies(), 4);
    }

    #[test]
    fn same_seed_same_phrases() {
        assert_eq!(context(42).texts(), context(42).texts());
    }
}

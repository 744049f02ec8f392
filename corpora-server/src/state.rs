use std::sync::Arc;

use corpora_core::catalog::Catalog;
use corpora_core::sketch::SketchIndex;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub sketch: Arc<dyn SketchIndex>,
}

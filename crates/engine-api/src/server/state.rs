#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<EngineApi>>,
}

impl AppState {
    fn new(engine: EngineApi) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }
}

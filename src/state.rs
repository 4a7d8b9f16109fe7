use crate::sessions::SessionManagerHandle;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManagerHandle,
}

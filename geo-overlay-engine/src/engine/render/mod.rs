/// Draw list handed to the host's GL context each frame.
pub mod frame;

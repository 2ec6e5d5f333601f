mod fakes;
mod lifecycle;
mod system;

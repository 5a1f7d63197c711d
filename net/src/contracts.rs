/*
Request and response bodies, versioned by path prefix so that a newer endpoint can
keep serving older monitors
*/

pub mod v1;

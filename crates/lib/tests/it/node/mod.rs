mod put;
mod subscribe;

/// Picks the first element of an iterable matching `$variant`, mapping it with `$map_fn`.
#[macro_export]
macro_rules! next_match {
    ($iter: expr, $variant: pat => $map_fn: expr) => {
        $iter
            .iter()
            .filter_map(|x| if let $variant = x { Some($map_fn) } else { None })
            .next()
    };
}
